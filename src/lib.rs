//! Generic AWS RPC bridge
//!
//! Call any query/ec2/json protocol AWS operation by name with a loosely-typed
//! parameter tree, and get back a plain JSON response with snake_case keys.
//!
//! ```no_run
//! # async fn demo() -> aws_invoke::BridgeResult<()> {
//! let mut request = aws_invoke::InvocationRequest::new("ec2", "describe_instances");
//! request.filters.insert("instance-state-name".into(), "running".into());
//! let response = aws_invoke::run(&request).await?;
//! println!("{}", response["reservations"]);
//! # Ok(())
//! # }
//! ```

pub mod aws;
pub mod bridge;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod marshal;
pub mod protocol;
pub mod request;

pub use bridge::{execute, finish_response, prepare_params, run};
pub use dispatch::{ClientIdentity, Operation, ServiceClient};
pub use error::{BridgeError, BridgeResult, ConnectionFailure};
pub use marshal::{KeyCase, ResponseNode, StreamingBody};
pub use request::{ConnectionConfig, InvocationRequest};
