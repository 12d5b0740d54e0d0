pub use shared::{
    ApiError, Coordinate, MarkerKey, Poi, PoiInstance, PoiLocation, RouteRequest, RouteResponse,
    TravelMode,
};
