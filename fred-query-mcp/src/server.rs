//! MCP server glue: advertises every fred-query tool over the Model Context
//! Protocol and forwards calls into the library.
//!
//! Tool bodies own their response shape; every call returns the compact
//! `ToolResponse` JSON as a single text content block, including errors, so
//! clients always see the same envelope.

use std::sync::Arc;

use rmcp::{
    ErrorData as McpError, RoleServer, ServerHandler, ServiceExt,
    handler::server::tool::{ToolCallContext, ToolRouter},
    handler::server::wrapper::Parameters,
    model::*,
    service::RequestContext,
    tool, tool_router,
};

use fred_query::AppContext;
use fred_query::response::ToolResponse;
use fred_query::tools::categories::{
    self, CategoryArgs, CategorySeriesArgs,
};
use fred_query::tools::health;
use fred_query::tools::observations::{self, ObservationsArgs};
use fred_query::tools::search::{self, SearchSeriesArgs};
use fred_query::tools::tags::{
    self, RelatedTagsArgs, SearchSeriesRelatedTagsArgs, SearchSeriesTagsArgs, SeriesByTagsArgs,
    SeriesTagsArgs, TagsArgs,
};
use fred_query::workflows::gdp::{self, GdpArgs};
use fred_query::workflows::inflation::{self, InflationArgs};

fn content(response: ToolResponse) -> CallToolResult {
    CallToolResult::success(vec![Content::text(response.to_compact_json())])
}

/// The MCP server. Holds the shared application context and the
/// auto-generated tool router.
#[derive(Clone)]
pub struct FredMcp {
    ctx: Arc<AppContext>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl FredMcp {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self {
            ctx,
            tool_router: Self::tool_router(),
        }
    }

    #[tool(
        name = "search_fred_series",
        description = "Search FRED economic data series by text or series id. Supports tag filters, attribute filters, ordering, and pagination. Returns compact series metadata (id, title, frequency, units, popularity)."
    )]
    async fn search_fred_series(
        &self,
        params: Parameters<SearchSeriesArgs>,
    ) -> Result<CallToolResult, McpError> {
        Ok(content(search::search_fred_series(&self.ctx, params.0).await))
    }

    #[tool(
        name = "get_fred_series_observations",
        description = "Fetch observations for a FRED series with optional transformation (units: lin, chg, ch1, pch, pc1, pca, cch, cca, log) and frequency aggregation (d, w, bw, m, q, sa, a with avg/sum/eop). Dates are YYYY-MM-DD."
    )]
    async fn get_fred_series_observations(
        &self,
        params: Parameters<ObservationsArgs>,
    ) -> Result<CallToolResult, McpError> {
        Ok(content(
            observations::get_fred_series_observations(&self.ctx, params.0).await,
        ))
    }

    #[tool(
        name = "get_fred_series_tags",
        description = "List the FRED tags attached to one series."
    )]
    async fn get_fred_series_tags(
        &self,
        params: Parameters<SeriesTagsArgs>,
    ) -> Result<CallToolResult, McpError> {
        Ok(content(tags::get_fred_series_tags(&self.ctx, params.0).await))
    }

    #[tool(
        name = "search_fred_series_tags",
        description = "List the tags carried by the series matching a search. Optionally narrow by tag name or tag group (freq, gen, geo, geot, rls, seas, src, cc)."
    )]
    async fn search_fred_series_tags(
        &self,
        params: Parameters<SearchSeriesTagsArgs>,
    ) -> Result<CallToolResult, McpError> {
        Ok(content(
            tags::search_fred_series_tags(&self.ctx, params.0).await,
        ))
    }

    #[tool(
        name = "search_fred_series_related_tags",
        description = "List tags related (by co-occurrence) to the given semicolon-delimited tag_names, scoped to a series search."
    )]
    async fn search_fred_series_related_tags(
        &self,
        params: Parameters<SearchSeriesRelatedTagsArgs>,
    ) -> Result<CallToolResult, McpError> {
        Ok(content(
            tags::search_fred_series_related_tags(&self.ctx, params.0).await,
        ))
    }

    #[tool(
        name = "get_fred_related_tags",
        description = "List tags that co-occur with the given semicolon-delimited tag_names across all of FRED."
    )]
    async fn get_fred_related_tags(
        &self,
        params: Parameters<RelatedTagsArgs>,
    ) -> Result<CallToolResult, McpError> {
        Ok(content(tags::get_fred_related_tags(&self.ctx, params.0).await))
    }

    #[tool(
        name = "get_fred_tags",
        description = "Browse FRED tags, optionally filtered by name search, explicit tag names, or tag group."
    )]
    async fn get_fred_tags(
        &self,
        params: Parameters<TagsArgs>,
    ) -> Result<CallToolResult, McpError> {
        Ok(content(tags::get_fred_tags(&self.ctx, params.0).await))
    }

    #[tool(
        name = "get_fred_series_by_tags",
        description = "Find FRED series carrying every tag in a semicolon-delimited tag_names list, optionally excluding tags."
    )]
    async fn get_fred_series_by_tags(
        &self,
        params: Parameters<SeriesByTagsArgs>,
    ) -> Result<CallToolResult, McpError> {
        Ok(content(
            tags::get_fred_series_by_tags(&self.ctx, params.0).await,
        ))
    }

    #[tool(
        name = "get_fred_category",
        description = "Fetch one node of the FRED category tree (category 0 is the root)."
    )]
    async fn get_fred_category(
        &self,
        params: Parameters<CategoryArgs>,
    ) -> Result<CallToolResult, McpError> {
        Ok(content(categories::get_fred_category(&self.ctx, params.0).await))
    }

    #[tool(
        name = "get_fred_category_children",
        description = "List the child categories of a FRED category."
    )]
    async fn get_fred_category_children(
        &self,
        params: Parameters<CategoryArgs>,
    ) -> Result<CallToolResult, McpError> {
        Ok(content(
            categories::get_fred_category_children(&self.ctx, params.0).await,
        ))
    }

    #[tool(
        name = "get_fred_category_series",
        description = "List the series owned by a FRED category, with ordering and pagination."
    )]
    async fn get_fred_category_series(
        &self,
        params: Parameters<CategorySeriesArgs>,
    ) -> Result<CallToolResult, McpError> {
        Ok(content(
            categories::get_fred_category_series(&self.ctx, params.0).await,
        ))
    }

    #[tool(
        name = "compare_inflation_across_regions",
        description = "Compare year-over-year inflation across regions or presets (g7, brics, eurozone_core, eurozone_periphery, nordic, north_america, asia_pacific, europe_major). Regions are comma-delimited. Returns a ranked latest snapshot, central-bank target analysis, base-effect flags, and (metric=trend|all) trends and convergence, with methodology comparability warnings."
    )]
    async fn compare_inflation_across_regions(
        &self,
        params: Parameters<InflationArgs>,
    ) -> Result<CallToolResult, McpError> {
        Ok(content(
            inflation::compare_inflation_across_regions(&self.ctx, params.0).await,
        ))
    }

    #[tool(
        name = "analyze_gdp_cross_country",
        description = "Cross-country GDP analysis over FRED's World Bank mirrors. Countries are comma-delimited codes or presets (g7, g20, brics, oecd, ...). Supports GDP variants (nominal_usd, constant_2010, per_capita_constant, per_capita_ppp, ppp_adjusted, population, growth_rate), comparison modes (absolute, indexed, per_capita, growth_rates, ppp, relative_to_benchmark), per-country growth metrics, sigma/beta convergence, structural-break detection, and rankings."
    )]
    async fn analyze_gdp_cross_country(
        &self,
        params: Parameters<GdpArgs>,
    ) -> Result<CallToolResult, McpError> {
        Ok(content(gdp::analyze_gdp_cross_country(&self.ctx, params.0).await))
    }

    #[tool(
        name = "system_health",
        description = "Report cache, rate-limiter, and metrics snapshots plus server version and uptime."
    )]
    async fn system_health(&self) -> Result<CallToolResult, McpError> {
        Ok(content(health::system_health(&self.ctx).await))
    }
}

impl ServerHandler for FredMcp {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "FRED economic data tools. Discovery: search_fred_series, tag and category \
                 tools. Data: get_fred_series_observations with FRED transformations. \
                 Workflows: compare_inflation_across_regions and analyze_gdp_cross_country \
                 fan out across countries and return harmonized analyses. Dates are \
                 YYYY-MM-DD; tag lists are semicolon-delimited; region/country lists are \
                 comma-delimited. system_health exposes cache/limiter/metrics state."
                    .into(),
            ),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability { list_changed: None }),
                ..Default::default()
            },
            server_info: Implementation {
                name: "fred-query".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                title: Some("FRED Query".into()),
                description: Some(
                    "Federal Reserve Economic Data tools with caching, rate limiting, and \
                     cross-country analysis workflows"
                        .into(),
                ),
                icons: None,
                website_url: None,
            },
            ..Default::default()
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, McpError>> + Send + '_ {
        std::future::ready(Ok(ListToolsResult {
            tools: self.tool_router.list_all(),
            next_cursor: None,
            meta: Default::default(),
        }))
    }

    fn call_tool(
        &self,
        request: CallToolRequestParams,
        context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<CallToolResult, McpError>> + Send + '_ {
        let tool_context = ToolCallContext::new(self, request, context);
        async move { self.tool_router.call(tool_context).await }
    }

    fn get_tool(&self, name: &str) -> Option<Tool> {
        self.tool_router.get(name).cloned()
    }
}

/// Serve MCP on stdio until the client disconnects.
pub async fn serve_stdio(ctx: Arc<AppContext>) -> anyhow::Result<()> {
    let server = FredMcp::new(ctx);
    let transport = rmcp::transport::io::stdio();
    let service = server.serve(transport).await.inspect_err(|e| {
        tracing::error!(error = %e, "MCP serve error");
    })?;
    service.waiting().await?;
    Ok(())
}
