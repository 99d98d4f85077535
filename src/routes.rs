// Route table - single source of truth for every (method, path) the service answers

use axum::routing::MethodFilter;

pub const HEALTH: &str = "/health";
pub const USER: &str = "/user";
pub const USERS: &str = "/users";

/// Operation a route dispatches to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Health,
    GetUser,
    ListUsers,
    SaveUser,
    ModifyUser,
}

#[derive(Debug, Clone, Copy)]
pub struct Route {
    pub method: MethodFilter,
    pub path: &'static str,
    pub endpoint: Endpoint,
}

/// Every route the service exposes. Anything else is a 404.
pub static ROUTES: &[Route] = &[
    Route {
        method: MethodFilter::GET,
        path: HEALTH,
        endpoint: Endpoint::Health,
    },
    Route {
        method: MethodFilter::GET,
        path: USER,
        endpoint: Endpoint::GetUser,
    },
    Route {
        method: MethodFilter::GET,
        path: USERS,
        endpoint: Endpoint::ListUsers,
    },
    Route {
        method: MethodFilter::POST,
        path: USER,
        endpoint: Endpoint::SaveUser,
    },
    Route {
        method: MethodFilter::PATCH,
        path: USER,
        endpoint: Endpoint::ModifyUser,
    },
];
