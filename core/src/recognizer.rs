use crate::config::RouteTable;
use crate::error::NavigationError;
use crate::options::ParamsInheritance;
use crate::snapshot::RouteSnapshot;
use crate::tree::TreeNode;
use crate::url_tree::UrlTree;
use async_trait::async_trait;
use std::sync::Arc;

/// Output of route recognition.
#[derive(Debug, Clone)]
pub struct Recognized {
    /// The requested tree after redirects.
    pub applied_url: UrlTree,
    /// Matched routes under the synthetic root, params and data already inherited.
    pub root: TreeNode<Arc<RouteSnapshot>>,
}

/// Redirect resolution plus route matching, as one black-box step of the pipeline.
#[async_trait]
pub trait Recognizer: Send + Sync {
    async fn recognize(
        &self,
        url: &UrlTree,
        table: &RouteTable,
        inheritance: ParamsInheritance,
    ) -> Result<Recognized, NavigationError>;
}
