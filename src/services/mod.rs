//! 业务服务模块
//!
//! - `gateway`：单个请求的完整编排
//! - `upload_store`：上传文件暂存

pub mod gateway;
pub mod upload_store;

pub use gateway::{Failure, Gateway, Reply};
pub use upload_store::UploadStore;
