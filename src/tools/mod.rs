pub mod bluesky;
pub mod context;
pub mod local_search;
pub mod session;
pub mod traits;

pub use bluesky::{BskyOp, BskyTool};
pub use context::ToolContext;
pub use local_search::LocalSearchTool;
pub use session::{LoginTool, LogoutTool, RefreshSessionTool, SessionsTool};
pub use traits::{Tool, ToolResult, ToolSpec};

use std::sync::Arc;

/// Full tool registry: session management, one tool per API operation and
/// the local post search.
pub fn all_tools(ctx: &Arc<ToolContext>) -> Vec<Box<dyn Tool>> {
    let mut tools: Vec<Box<dyn Tool>> = vec![
        Box::new(LoginTool::new(ctx.clone())),
        Box::new(LogoutTool::new(ctx.clone())),
        Box::new(RefreshSessionTool::new(ctx.clone())),
        Box::new(SessionsTool::new(ctx.clone())),
    ];
    tools.extend(
        BskyOp::ALL
            .into_iter()
            .map(|op| Box::new(BskyTool::new(op, ctx.clone())) as Box<dyn Tool>),
    );
    tools.push(Box::new(LocalSearchTool::new(ctx.store.clone())));
    tools
}

pub fn find_tool<'a>(tools: &'a [Box<dyn Tool>], name: &str) -> Option<&'a dyn Tool> {
    tools.iter().find(|t| t.name() == name).map(|t| &**t)
}
