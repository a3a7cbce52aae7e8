pub mod codec;
pub mod error;
pub mod nameserver;
pub mod status;


pub use codec::JsonCodec;
pub use error::{Result, RpcError};
pub use nameserver::{
    FindServiceRequest, FindServiceResponse, FindServicesRequest,
    FindServicesResponse, ServiceInfo, NAMESERVER_SERVICES,
};
pub use status::RpcStatus;
