use crate::model::{
    Id,
    post::{Post, PostMarker},
};
use serde::{Deserialize, Serialize};

/// Name of the realtime channel post events are published on.
pub const POSTS_CHANNEL: &str = "posts";

/// A change to the post collection, pushed to every connected client.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
#[serde(tag = "action", content = "post", rename_all = "lowercase")]
pub enum PostEvent {
    Create(Post),
    Update(Post),
    Delete(Id<PostMarker>),
}

impl PostEvent {
    #[must_use]
    pub fn post_id(&self) -> Id<PostMarker> {
        match self {
            PostEvent::Create(post) | PostEvent::Update(post) => post.id,
            PostEvent::Delete(id) => *id,
        }
    }
}
