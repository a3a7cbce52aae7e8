//! Nameserver wire types
//!
//! The nameserver is reached through the same HTTP RPC mechanism it describes:
//! each of its operations is a service name (an HTTP request target) that the
//! client registers against the nameserver's address.
//!
//! # Wire Format
//!
//! ```text
//! find-service   {"service_path": "/orders"}
//!             -> {"status": "ok", "server_addrs": ["10.0.0.2:8080"]}
//! find-services  {"service_paths": ["/orders", "/users"]}
//!             -> {"status": "ok", "service_infos": {"/orders": {"server_addrs": ["10.0.0.2:8080"]}}}
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

pub const ADD_SERVICE: &str = "/nameserver/service_mgr/add";
pub const DEL_SERVICE: &str = "/nameserver/service_mgr/del";
pub const FIND_SERVICE: &str = "/nameserver/service_mgr/find";
pub const FIND_SERVICES: &str = "/nameserver/service_mgr/finds";
pub const LIST_SERVICES: &str = "/nameserver/service_mgr/list";

/// Service names the nameserver itself answers on.
pub const NAMESERVER_SERVICES: [&str; 5] = [
    ADD_SERVICE,
    DEL_SERVICE,
    FIND_SERVICE,
    FIND_SERVICES,
    LIST_SERVICES,
];

/// Status value of a successful nameserver reply.
pub const STATUS_OK: &str = "ok";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FindServiceRequest {
    pub service_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FindServiceResponse {
    pub status: String,
    #[serde(default)]
    pub server_addrs: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FindServicesRequest {
    pub service_paths: Vec<String>,
}

/// Live addresses of one service in a find-services reply.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ServiceInfo {
    #[serde(default)]
    pub server_addrs: BTreeSet<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FindServicesResponse {
    pub status: String,
    #[serde(default)]
    pub service_infos: HashMap<String, ServiceInfo>,
}
