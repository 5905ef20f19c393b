//! The `system_health` tool: the only externally observable view of the
//! cache, limiter, and metric registry state.

use serde_json::json;

use crate::AppContext;
use crate::response::ToolResponse;

const TOOL: &str = "system_health";

/// Snapshot cache, limiter, and telemetry state.
pub async fn system_health(ctx: &AppContext) -> ToolResponse {
    let data = json!({
        "cache": ctx.cache.snapshot().await,
        "rate_limiter": ctx.limiter.snapshot(),
        "metrics": ctx.telemetry.snapshot(),
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": ctx.telemetry.uptime_seconds(),
    });
    ToolResponse::success(TOOL, data, serde_json::Map::new())
}
