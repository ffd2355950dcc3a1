use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

use super::VideoMetrics;

/// A container the scanner can descend into.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Traversable<N> {
    /// A plain element subtree, usually a document body.
    Subtree(N),
    /// An open shadow root attached to some host under the current root.
    Shadow(N),
    /// An iframe found under the current root.
    Frame(FrameAccess<N>),
}

/// What an iframe exposes to script running in the parent document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FrameAccess<N> {
    /// Same-origin frame; carries the frame document's body.
    SameOrigin(N),
    /// No document loaded into the frame yet.
    Unloaded,
    /// Content belongs to another origin and cannot be read.
    CrossOrigin { src: String },
}

/// Placement of the injected control relative to the video's container.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlaySpec {
    /// Marker class used for the presence check.
    pub class_name: String,
    /// Distance from the bottom-right corner.
    pub inset_px: u32,
    pub size_px: u32,
    pub z_index: i64,
}

impl Default for OverlaySpec {
    fn default() -> Self {
        Self {
            class_name: "video-saver-btn".to_string(),
            inset_px: 10,
            size_px: 40,
            z_index: 2147483647,
        }
    }
}

impl OverlaySpec {
    /// Inline style for the control element.
    pub fn style(&self) -> String {
        format!(
            "position: absolute; right: {inset}px; bottom: {inset}px; width: {size}px; height: {size}px; \
             background-color: rgba(0, 0, 0, 0.7); border-radius: 50%; z-index: {z}; display: flex; \
             align-items: center; justify-content: center; cursor: pointer; color: white;",
            inset = self.inset_px,
            size = self.size_px,
            z = self.z_index,
        )
    }
}

/// Callback run when a user activates the control attached to a video.
pub struct OverlayHandler<D: DomTree>(Arc<dyn Fn(&D, &D::Node) + Send + Sync>);

impl<D: DomTree> OverlayHandler<D> {
    pub fn new(f: impl Fn(&D, &D::Node) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn activate(&self, dom: &D, video: &D::Node) {
        (*self.0)(dom, video)
    }
}

impl<D: DomTree> Clone for OverlayHandler<D> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<D: DomTree> fmt::Debug for OverlayHandler<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("OverlayHandler")
    }
}

/// Outcome of `DomTree::attach_overlay`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Attachment<N> {
    /// A new control was injected.
    Created(N),
    /// The video already carried a connected control.
    Existing(N),
}

impl<N> Attachment<N> {
    pub fn is_created(&self) -> bool {
        matches!(self, Attachment::Created(_))
    }

    pub fn into_node(self) -> N {
        match self {
            Attachment::Created(node) | Attachment::Existing(node) => node,
        }
    }
}

/// The slice of a document tree the engine needs.
///
/// `videos` and `containers` look at descendants of `root` inside the same
/// tree only; shadow roots and frame documents are reached through
/// `containers`.
pub trait DomTree: Clone + Send + Sync + 'static {
    type Node: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static;

    fn videos(&self, root: &Self::Node) -> Vec<Self::Node>;

    fn containers(&self, root: &Self::Node) -> Vec<Traversable<Self::Node>>;

    /// The control currently attached to `video`, if it is still in the tree.
    fn overlay_for(&self, video: &Self::Node) -> Option<Self::Node>;

    /// Gives `video` a control unless it already has a connected one. The
    /// presence check and the injection happen atomically, so concurrent
    /// callers never stack two controls on one video. Returns `None` when the
    /// video has no container to host a control.
    fn attach_overlay(
        &self,
        video: &Self::Node,
        spec: &OverlaySpec,
        handler: OverlayHandler<Self>,
    ) -> Option<Attachment<Self::Node>>;

    fn video_metrics(&self, video: &Self::Node) -> VideoMetrics;

    /// Text of every inline script in the top-level document, in document order.
    fn script_texts(&self) -> Vec<String>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MutationKind {
    ChildList,
    Attributes { name: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MutationRecord<N> {
    pub kind: MutationKind,
    pub target: N,
}

pub type MutationBatch<N> = Vec<MutationRecord<N>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ObserveOptions {
    pub child_list: bool,
    pub attributes: bool,
    pub subtree: bool,
}

impl ObserveOptions {
    /// Everything under the root.
    pub fn all() -> Self {
        Self {
            child_list: true,
            attributes: true,
            subtree: true,
        }
    }

    pub fn accepts(&self, kind: &MutationKind) -> bool {
        match kind {
            MutationKind::ChildList => self.child_list,
            MutationKind::Attributes { .. } => self.attributes,
        }
    }
}

/// A tree that reports changes in batches.
pub trait MutationSource: DomTree {
    /// Starts delivering batches that touch `root`. Dropping the receiver
    /// ends the observation.
    fn observe(
        &self,
        root: &Self::Node,
        options: ObserveOptions,
    ) -> UnboundedReceiver<MutationBatch<Self::Node>>;
}
