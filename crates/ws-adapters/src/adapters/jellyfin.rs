//! Jellyfin adapter. Identical wire contract to Emby except the progress
//! endpoint requires server version >= 10.9 (spec §4.2).

use std::sync::Arc;

use async_trait::async_trait;
use semver::Version;
use ws_queue::{Queue, ReqwestTransport, Transport};
use ws_types::{BackendUser, Library, PageRequest, RawItem, RawPage, RequestAttributes, Response, State, WebhookRequest};

use super::jellyfin_emby::JellyfinEmbyCore;
use crate::adapter::BackendAdapter;
use crate::context::Context;

pub struct JellyfinAdapter {
    core: JellyfinEmbyCore,
}

impl Default for JellyfinAdapter {
    fn default() -> Self {
        JellyfinAdapter::new(Arc::new(ReqwestTransport::default()))
    }
}

impl JellyfinAdapter {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        JellyfinAdapter {
            core: JellyfinEmbyCore {
                backend_name: "jellyfin",
                transport,
                progress_min_version: Some(Version::new(10, 9, 0)),
            },
        }
    }
}

#[async_trait]
impl BackendAdapter for JellyfinAdapter {
    fn name(&self) -> &str {
        "jellyfin"
    }

    async fn list_libraries(&self, ctx: &Context) -> Response<Vec<Library>> {
        self.core.list_libraries(ctx).await
    }

    async fn get_library_page(&self, ctx: &Context, req: &PageRequest, queue: &Queue) -> Response<RawPage> {
        self.core.get_library_page(ctx, req, queue).await
    }

    async fn get_metadata(&self, ctx: &Context, remote_id: &str) -> Response<RawItem> {
        self.core.get_metadata(ctx, remote_id).await
    }

    fn to_states(&self, _ctx: &Context, raw: &RawItem) -> Response<Vec<State>> {
        self.core.to_states(raw)
    }

    fn parse_webhook(&self, _ctx: &Context, req: &WebhookRequest) -> Response<State> {
        self.core.parse_webhook(req)
    }

    fn inspect_request(&self, _ctx: &Context, req: &WebhookRequest) -> Response<RequestAttributes> {
        self.core.inspect_request(req)
    }

    async fn push(&self, ctx: &Context, states: &[State], queue: &mut Queue) -> Response<()> {
        self.core.push(ctx, states, queue).await
    }

    async fn progress(&self, ctx: &Context, states: &[State], queue: &mut Queue) -> Response<()> {
        self.core.progress(ctx, states, queue).await
    }

    async fn search(&self, ctx: &Context, query: &str, limit: u32) -> Response<Vec<RawItem>> {
        self.core.search(ctx, query, limit).await
    }

    async fn search_by_id(&self, ctx: &Context, remote_id: &str) -> Response<Vec<RawItem>> {
        self.core.search_by_id(ctx, remote_id).await
    }

    async fn get_identifier(&self, ctx: &Context, force_refresh: bool) -> Response<String> {
        self.core.get_identifier(ctx, force_refresh).await
    }

    async fn list_users(&self, ctx: &Context) -> Response<Vec<BackendUser>> {
        self.core.list_users(ctx).await
    }

    async fn get_version(&self, ctx: &Context) -> Response<Version> {
        self.core.get_version(ctx).await
    }
}
