use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    #[error("routing service unreachable: {0}")]
    Network(String),
    #[error("no route between the given points")]
    NoRoute,
    #[error("routing service timed out")]
    Timeout,
    #[error("unexpected routing response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for RoutingError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RoutingError::Timeout
        } else if err.is_decode() {
            RoutingError::InvalidResponse(err.to_string())
        } else {
            RoutingError::Network(err.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("a route needs at least two waypoints, got {0}")]
    NotEnoughWaypoints(usize),
    #[error(transparent)]
    Routing(#[from] RoutingError),
}
