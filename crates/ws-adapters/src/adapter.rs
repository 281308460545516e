//! The `BackendAdapter` capability set every vendor implementation
//! satisfies — spec §4.2.

use async_trait::async_trait;
use semver::Version;
use ws_queue::Queue;
use ws_types::{
    BackendUser, Library, PageRequest, RawItem, RawPage, RequestAttributes, Response, State,
    WebhookRequest,
};

use crate::context::Context;

#[async_trait]
pub trait BackendAdapter: Send + Sync {
    fn name(&self) -> &str;

    async fn list_libraries(&self, ctx: &Context) -> Response<Vec<Library>>;

    /// Routed through `queue` (spec: the paginated fetch happens "via
    /// queue") so a transient network error or 5xx/429 on a page or count
    /// request gets the same retry/backoff as writes, instead of failing
    /// that page outright on the first blip.
    async fn get_library_page(&self, ctx: &Context, req: &PageRequest, queue: &Queue) -> Response<RawPage>;

    async fn get_metadata(&self, ctx: &Context, remote_id: &str) -> Response<RawItem>;

    /// Convert one decoded raw item into canonical `State`(s). A multi-episode
    /// file (`IndexNumberEnd` range) yields more than one `State` — spec
    /// §4.3 step 7.
    fn to_states(&self, ctx: &Context, raw: &RawItem) -> Response<Vec<State>>;

    fn parse_webhook(&self, ctx: &Context, req: &WebhookRequest) -> Response<State>;

    fn inspect_request(&self, ctx: &Context, req: &WebhookRequest) -> Response<RequestAttributes>;

    async fn push(&self, ctx: &Context, states: &[State], queue: &mut Queue) -> Response<()>;

    async fn progress(&self, ctx: &Context, states: &[State], queue: &mut Queue) -> Response<()>;

    async fn search(&self, ctx: &Context, query: &str, limit: u32) -> Response<Vec<RawItem>>;

    async fn search_by_id(&self, ctx: &Context, remote_id: &str) -> Response<Vec<RawItem>>;

    async fn get_identifier(&self, ctx: &Context, force_refresh: bool) -> Response<String>;

    async fn list_users(&self, ctx: &Context) -> Response<Vec<BackendUser>>;

    async fn get_version(&self, ctx: &Context) -> Response<Version>;
}
