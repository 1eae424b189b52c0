use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The RPC layer failed before the robot produced an answer.
    #[error("spot-sdk: Rpc : {}", message)]
    Rpc { message: String },
    /// The robot answered and rejected the request.
    #[error("spot-sdk: Response : {}", message)]
    Response { message: String },
    #[error("spot-sdk: Uninitialized : {}", message)]
    Uninitialized { message: String },
    #[error("spot-sdk: Other: {:?}", .0)]
    Other(#[from] anyhow::Error),
}
