//! docgate 可执行入口
//!
//! 配置文件路径：`DOCGATE_CONFIG`，默认 `~/.docgate/config.yaml`。
//! 日志级别：`RUST_LOG` 优先，否则使用配置中的 `logging.level`。

use std::sync::Arc;

use anyhow::Context;

use docgate_lib::config::{load_config, resolve_config_path};
use docgate_lib::logging::init_tracing;
use docgate_lib::{run_server, HttpDocumentService};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let path = resolve_config_path();
    let config = load_config(&path).with_context(|| format!("loading {}", path.display()))?;
    init_tracing(&config.logging);

    let service = HttpDocumentService::new(&config.downstream)
        .with_context(|| format!("invalid downstream URL {}", config.downstream.base_url))?;
    tracing::info!("[GATEWAY] downstream service at {}", service.base_url());

    run_server(config, Arc::new(service)).await
}
