//! In-memory document tree.
//!
//! `PageDom` stands in for a live browser document: it can be built node by
//! node or imported from an HTML snapshot, keeps shadow roots and frame
//! documents as separate trees, reports mutations to observers and
//! dispatches activations of injected controls.

use parking_lot::RwLock;
use scraper::{ElementRef, Html};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use url::Url;

use super::dom::{
    Attachment, DomTree, FrameAccess, MutationBatch, MutationKind, MutationRecord, MutationSource,
    ObserveOptions, OverlayHandler, OverlaySpec, Traversable,
};
use super::VideoMetrics;

pub type NodeId = usize;

// Nested srcdoc frames deeper than this are left unloaded.
const MAX_FRAME_DEPTH: usize = 8;

#[derive(Clone, Debug)]
enum NodeKind {
    Document { owner: Option<NodeId> },
    ShadowRoot { host: NodeId, open: bool },
    Element { tag: String, attrs: Vec<(String, String)> },
    Text(String),
}

#[derive(Clone, Debug)]
enum FrameContent {
    Document(NodeId),
    CrossOrigin(String),
}

#[derive(Debug)]
struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    shadow_root: Option<NodeId>,
    frame: Option<FrameContent>,
    metrics: VideoMetrics,
}

impl NodeData {
    fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            parent: None,
            children: Vec::new(),
            shadow_root: None,
            frame: None,
            metrics: VideoMetrics::default(),
        }
    }

    fn tag(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Element { tag, .. } => Some(tag),
            _ => None,
        }
    }

    fn attr(&self, name: &str) -> Option<&str> {
        match &self.kind {
            NodeKind::Element { attrs, .. } => attrs
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.as_str()),
            _ => None,
        }
    }
}

struct Attached {
    video: NodeId,
    handler: OverlayHandler<PageDom>,
}

struct Observer {
    root: NodeId,
    options: ObserveOptions,
    tx: UnboundedSender<MutationBatch<NodeId>>,
}

struct Inner {
    nodes: Vec<NodeData>,
    document: NodeId,
    overlay_by_video: HashMap<NodeId, NodeId>,
    overlays: HashMap<NodeId, Attached>,
    observers: Vec<Observer>,
}

impl Inner {
    fn empty() -> Self {
        let mut inner = Self {
            nodes: Vec::new(),
            document: 0,
            overlay_by_video: HashMap::new(),
            overlays: HashMap::new(),
            observers: Vec::new(),
        };
        inner.document = inner.push(NodeKind::Document { owner: None });
        inner
    }

    fn push(&mut self, kind: NodeKind) -> NodeId {
        self.nodes.push(NodeData::new(kind));
        self.nodes.len() - 1
    }

    fn element(&mut self, tag: &str, attrs: Vec<(String, String)>) -> NodeId {
        self.push(NodeKind::Element {
            tag: tag.to_ascii_lowercase(),
            attrs,
        })
    }

    fn link(&mut self, parent: NodeId, child: NodeId) {
        if let Some(old) = self.nodes[child].parent.take() {
            self.nodes[old].children.retain(|c| *c != child);
        }
        self.nodes[child].parent = Some(parent);
        self.nodes[parent].children.push(child);
    }

    /// Fresh document with the usual html/head/body skeleton; returns (document, body).
    fn skeleton(&mut self, owner: Option<NodeId>) -> (NodeId, NodeId) {
        let document = self.push(NodeKind::Document { owner });
        let body = self.populate(document);
        (document, body)
    }

    /// Fills an empty document with html/head/body; returns the body.
    fn populate(&mut self, document: NodeId) -> NodeId {
        let html = self.element("html", Vec::new());
        let head = self.element("head", Vec::new());
        let body = self.element("body", Vec::new());
        self.link(document, html);
        self.link(html, head);
        self.link(html, body);
        body
    }

    /// Preorder descendants of `root` within its own tree.
    fn descendants(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = match self.nodes.get(root) {
            Some(node) => node.children.iter().rev().copied().collect(),
            None => return out,
        };
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.nodes[id].children.iter().rev().copied());
        }
        out
    }

    fn body_of(&self, document: NodeId) -> NodeId {
        self.descendants(document)
            .into_iter()
            .find(|id| self.nodes[*id].tag() == Some("body"))
            .unwrap_or(document)
    }

    fn is_inclusive_descendant(&self, target: NodeId, root: NodeId) -> bool {
        let mut current = Some(target);
        while let Some(id) = current {
            if id == root {
                return true;
            }
            current = self.nodes[id].parent;
        }
        false
    }

    /// Like `is_inclusive_descendant` but steps out of shadow roots and frame
    /// documents into their host elements.
    fn is_composed_descendant(&self, target: NodeId, root: NodeId) -> bool {
        let mut current = Some(target);
        while let Some(id) = current {
            if id == root {
                return true;
            }
            current = match (&self.nodes[id].kind, self.nodes[id].parent) {
                (_, Some(parent)) => Some(parent),
                (NodeKind::ShadowRoot { host, .. }, None) => Some(*host),
                (NodeKind::Document { owner }, None) => *owner,
                _ => None,
            };
        }
        false
    }

    fn contains(&self, node: NodeId) -> bool {
        node < self.nodes.len()
    }

    fn connected_overlay(&self, video: NodeId) -> Option<NodeId> {
        let overlay = *self.overlay_by_video.get(&video)?;
        self.nodes[overlay].parent.map(|_| overlay)
    }

    fn set_attr(&mut self, node: NodeId, name: &str, value: &str) {
        if let NodeKind::Element { attrs, .. } = &mut self.nodes[node].kind {
            match attrs.iter_mut().find(|(key, _)| key == name) {
                Some(entry) => entry.1 = value.to_string(),
                None => attrs.push((name.to_string(), value.to_string())),
            }
        }
    }

    fn text_content(&self, node: NodeId) -> String {
        let mut text = String::new();
        for id in std::iter::once(node).chain(self.descendants(node)) {
            if let NodeKind::Text(t) = &self.nodes[id].kind {
                text.push_str(t);
            }
        }
        text
    }

    fn emit(&mut self, records: Vec<MutationRecord<NodeId>>) {
        if records.is_empty() || self.observers.is_empty() {
            return;
        }

        let mut observers = std::mem::take(&mut self.observers);
        observers.retain(|observer| {
            let batch: MutationBatch<NodeId> = records
                .iter()
                .filter(|record| observer.options.accepts(&record.kind))
                .filter(|record| {
                    record.target == observer.root
                        || (observer.options.subtree
                            && self.is_inclusive_descendant(record.target, observer.root))
                })
                .cloned()
                .collect();
            batch.is_empty() || observer.tx.send(batch).is_ok()
        });
        self.observers = observers;
    }

    fn import_document(&mut self, html: &str, page_url: Option<&Url>, owner: Option<NodeId>, depth: usize) -> NodeId {
        let parsed = Html::parse_document(html);
        let document = match owner {
            None => self.document,
            Some(_) => self.push(NodeKind::Document { owner }),
        };
        let root = self.import_element(parsed.root_element(), page_url, depth);
        self.link(document, root);
        document
    }

    fn import_element(&mut self, element: ElementRef<'_>, page_url: Option<&Url>, depth: usize) -> NodeId {
        let value = element.value();
        let attrs: Vec<(String, String)> = value
            .attrs()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let id = self.element(value.name(), attrs);

        if value.name() == "iframe" {
            self.nodes[id].frame = self.import_frame(id, value.attr("srcdoc"), value.attr("src"), page_url, depth);
            return id;
        }

        if value.name() == "template" {
            // Inert template content is not part of the document.
            return id;
        }

        for child in element.children() {
            if let Some(text) = child.value().as_text() {
                let text_id = self.push(NodeKind::Text(String::from(&**text)));
                self.link(id, text_id);
                continue;
            }

            let Some(child_el) = ElementRef::wrap(child) else {
                continue;
            };

            match child_el.value().attr("shadowrootmode") {
                Some(mode) if child_el.value().name() == "template" && self.nodes[id].shadow_root.is_none() => {
                    let shadow = self.push(NodeKind::ShadowRoot {
                        host: id,
                        open: mode.eq_ignore_ascii_case("open"),
                    });
                    self.nodes[id].shadow_root = Some(shadow);
                    for grandchild in child_el.children().filter_map(ElementRef::wrap) {
                        let imported = self.import_element(grandchild, page_url, depth);
                        self.link(shadow, imported);
                    }
                }
                _ => {
                    let imported = self.import_element(child_el, page_url, depth);
                    self.link(id, imported);
                }
            }
        }

        id
    }

    fn import_frame(
        &mut self,
        iframe: NodeId,
        srcdoc: Option<&str>,
        src: Option<&str>,
        page_url: Option<&Url>,
        depth: usize,
    ) -> Option<FrameContent> {
        if let Some(srcdoc) = srcdoc {
            if depth >= MAX_FRAME_DEPTH {
                return None;
            }
            let document = self.import_document(srcdoc, page_url, Some(iframe), depth + 1);
            return Some(FrameContent::Document(document));
        }

        let src = src.map(str::trim).filter(|s| !s.is_empty() && *s != "about:blank")?;
        let resolved = match page_url {
            Some(base) => base.join(src).ok(),
            None => Url::parse(src).ok(),
        }?;

        match page_url {
            Some(base) if base.origin() == resolved.origin() => None,
            _ => Some(FrameContent::CrossOrigin(resolved.into())),
        }
    }
}

/// Shared handle to an in-memory document.
#[derive(Clone)]
pub struct PageDom {
    inner: Arc<RwLock<Inner>>,
}

impl Default for PageDom {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PageDom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("PageDom")
            .field("nodes", &inner.nodes.len())
            .field("overlays", &inner.overlays.len())
            .finish()
    }
}

impl PageDom {
    /// Empty document with an html/head/body skeleton.
    pub fn new() -> Self {
        let mut inner = Inner::empty();
        let document = inner.document;
        inner.populate(document);
        Self {
            inner: Arc::new(RwLock::new(inner)),
        }
    }

    /// Imports an HTML snapshot. `page_url` decides which `src` frames are
    /// same-origin; without it every `src` frame counts as foreign.
    /// `srcdoc` frames and `<template shadowrootmode>` roots are expanded.
    pub fn from_html(html: &str, page_url: Option<&Url>) -> Self {
        let mut inner = Inner::empty();
        inner.import_document(html, page_url, None, 0);
        Self {
            inner: Arc::new(RwLock::new(inner)),
        }
    }

    pub fn document(&self) -> NodeId {
        self.inner.read().document
    }

    pub fn body(&self) -> NodeId {
        let inner = self.inner.read();
        inner.body_of(inner.document)
    }

    pub fn create_element(&self, tag: &str) -> NodeId {
        self.inner.write().element(tag, Vec::new())
    }

    /// Unknown ids, and moves that would put `child` inside itself, leave
    /// the tree untouched.
    pub fn append_child(&self, parent: NodeId, child: NodeId) {
        let mut inner = self.inner.write();
        if !inner.contains(parent) || !inner.contains(child) || inner.is_inclusive_descendant(parent, child) {
            return;
        }
        inner.link(parent, child);
        inner.emit(vec![MutationRecord {
            kind: MutationKind::ChildList,
            target: parent,
        }]);
    }

    pub fn append_element(&self, parent: NodeId, tag: &str) -> NodeId {
        let child = self.create_element(tag);
        self.append_child(parent, child);
        child
    }

    pub fn append_video(&self, parent: NodeId, metrics: VideoMetrics) -> NodeId {
        let video = self.create_element("video");
        self.set_video_metrics(video, metrics);
        self.append_child(parent, video);
        video
    }

    pub fn append_script(&self, parent: NodeId, source: &str) -> NodeId {
        let script = {
            let mut inner = self.inner.write();
            let script = inner.element("script", Vec::new());
            let text = inner.push(NodeKind::Text(source.to_string()));
            inner.link(script, text);
            script
        };
        self.append_child(parent, script);
        script
    }

    pub fn set_attribute(&self, node: NodeId, name: &str, value: &str) {
        let mut inner = self.inner.write();
        if !inner.contains(node) {
            return;
        }
        inner.set_attr(node, name, value);
        inner.emit(vec![MutationRecord {
            kind: MutationKind::Attributes {
                name: name.to_string(),
            },
            target: node,
        }]);
    }

    pub fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.inner.read().nodes.get(node)?.attr(name).map(str::to_string)
    }

    pub fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.attribute(node, "class")
            .map(|classes| classes.split_ascii_whitespace().any(|c| c == class))
            .unwrap_or(false)
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.inner.read().nodes.get(node)?.parent
    }

    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.inner
            .read()
            .nodes
            .get(node)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    /// First node in any tree carrying `id="…"`.
    pub fn element_by_id(&self, id: &str) -> Option<NodeId> {
        let inner = self.inner.read();
        inner.nodes.iter().position(|n| n.attr("id") == Some(id))
    }

    /// Shadow root of `host`, created on first call. `None` for unknown ids.
    pub fn attach_shadow(&self, host: NodeId, open: bool) -> Option<NodeId> {
        let mut inner = self.inner.write();
        if let Some(existing) = inner.nodes.get(host)?.shadow_root {
            return Some(existing);
        }
        let shadow = inner.push(NodeKind::ShadowRoot { host, open });
        inner.nodes[host].shadow_root = Some(shadow);
        Some(shadow)
    }

    /// Loads an empty same-origin document into `iframe`; returns its body.
    pub fn load_frame(&self, iframe: NodeId) -> Option<NodeId> {
        let mut inner = self.inner.write();
        if !inner.contains(iframe) {
            return None;
        }
        let (document, body) = inner.skeleton(Some(iframe));
        inner.nodes[iframe].frame = Some(FrameContent::Document(document));
        Some(body)
    }

    pub fn set_cross_origin_frame(&self, iframe: NodeId, src: &str) {
        if let Some(node) = self.inner.write().nodes.get_mut(iframe) {
            node.frame = Some(FrameContent::CrossOrigin(src.to_string()));
        }
    }

    pub fn set_video_metrics(&self, video: NodeId, metrics: VideoMetrics) {
        if let Some(node) = self.inner.write().nodes.get_mut(video) {
            node.metrics = metrics;
        }
    }

    /// Detaches `node`. Controls of videos inside the removed subtree go with
    /// it; removing a control on its own frees its video for re-annotation.
    pub fn remove(&self, node: NodeId) {
        let mut inner = self.inner.write();
        let Some(parent) = inner.nodes.get_mut(node).and_then(|n| n.parent.take()) else {
            return;
        };
        inner.nodes[parent].children.retain(|c| *c != node);

        let mut records = vec![MutationRecord {
            kind: MutationKind::ChildList,
            target: parent,
        }];

        if let Some(attached) = inner.overlays.remove(&node) {
            inner.overlay_by_video.remove(&attached.video);
        }

        let orphaned: Vec<NodeId> = inner
            .overlay_by_video
            .keys()
            .copied()
            .filter(|video| inner.is_composed_descendant(*video, node))
            .collect();
        for video in orphaned {
            let Some(overlay) = inner.overlay_by_video.remove(&video) else {
                continue;
            };
            inner.overlays.remove(&overlay);
            if let Some(overlay_parent) = inner.nodes[overlay].parent.take() {
                inner.nodes[overlay_parent].children.retain(|c| *c != overlay);
                records.push(MutationRecord {
                    kind: MutationKind::ChildList,
                    target: overlay_parent,
                });
            }
        }

        inner.emit(records);
    }

    /// Connected controls, oldest first.
    pub fn overlays(&self) -> Vec<NodeId> {
        let inner = self.inner.read();
        let mut overlays: Vec<NodeId> = inner
            .overlays
            .keys()
            .copied()
            .filter(|o| inner.nodes[*o].parent.is_some())
            .collect();
        overlays.sort_unstable();
        overlays
    }

    pub fn overlay_target(&self, overlay: NodeId) -> Option<NodeId> {
        self.inner.read().overlays.get(&overlay).map(|a| a.video)
    }

    /// Simulates a user activating `overlay`. Returns `false` when the node
    /// is not a control.
    pub fn click(&self, overlay: NodeId) -> bool {
        let target = {
            let inner = self.inner.read();
            inner
                .overlays
                .get(&overlay)
                .map(|a| (a.handler.clone(), a.video))
        };

        match target {
            Some((handler, video)) => {
                handler.activate(self, &video);
                true
            }
            None => false,
        }
    }
}

fn has_explicit_position(style: Option<&str>) -> bool {
    style
        .unwrap_or_default()
        .split(';')
        .filter_map(|decl| decl.split_once(':'))
        .any(|(key, value)| key.trim() == "position" && value.trim() != "static")
}

impl DomTree for PageDom {
    type Node = NodeId;

    fn videos(&self, root: &NodeId) -> Vec<NodeId> {
        let inner = self.inner.read();
        inner
            .descendants(*root)
            .into_iter()
            .filter(|id| inner.nodes[*id].tag() == Some("video"))
            .collect()
    }

    fn containers(&self, root: &NodeId) -> Vec<Traversable<NodeId>> {
        let inner = self.inner.read();
        let mut out = Vec::new();
        for id in inner.descendants(*root) {
            let node = &inner.nodes[id];
            if let Some(shadow) = node.shadow_root {
                if matches!(inner.nodes[shadow].kind, NodeKind::ShadowRoot { open: true, .. }) {
                    out.push(Traversable::Shadow(shadow));
                }
            }
            if node.tag() == Some("iframe") {
                let access = match &node.frame {
                    Some(FrameContent::Document(document)) => FrameAccess::SameOrigin(inner.body_of(*document)),
                    Some(FrameContent::CrossOrigin(src)) => FrameAccess::CrossOrigin { src: src.clone() },
                    None => FrameAccess::Unloaded,
                };
                out.push(Traversable::Frame(access));
            }
        }
        out
    }

    fn overlay_for(&self, video: &NodeId) -> Option<NodeId> {
        self.inner.read().connected_overlay(*video)
    }

    fn attach_overlay(
        &self,
        video: &NodeId,
        spec: &OverlaySpec,
        handler: OverlayHandler<Self>,
    ) -> Option<Attachment<NodeId>> {
        let mut inner = self.inner.write();
        let parent = inner.nodes.get(*video)?.parent?;
        if let Some(existing) = inner.connected_overlay(*video) {
            return Some(Attachment::Existing(existing));
        }

        let overlay = inner.element(
            "div",
            vec![
                ("class".to_string(), spec.class_name.clone()),
                ("style".to_string(), spec.style()),
            ],
        );
        let icon = inner.element("span", Vec::new());
        let glyph = inner.push(NodeKind::Text("\u{2b07}".to_string()));
        inner.link(icon, glyph);
        inner.link(overlay, icon);

        let mut records = Vec::new();
        if inner.nodes[parent].tag().is_some() && !has_explicit_position(inner.nodes[parent].attr("style")) {
            let style = match inner.nodes[parent].attr("style") {
                Some(existing) if !existing.trim().is_empty() => {
                    format!("{}; position: relative", existing.trim().trim_end_matches(';'))
                }
                _ => "position: relative".to_string(),
            };
            inner.set_attr(parent, "style", &style);
            records.push(MutationRecord {
                kind: MutationKind::Attributes {
                    name: "style".to_string(),
                },
                target: parent,
            });
        }

        inner.link(parent, overlay);
        records.push(MutationRecord {
            kind: MutationKind::ChildList,
            target: parent,
        });

        if let Some(stale) = inner.overlay_by_video.insert(*video, overlay) {
            inner.overlays.remove(&stale);
        }
        inner.overlays.insert(overlay, Attached { video: *video, handler });
        inner.emit(records);

        Some(Attachment::Created(overlay))
    }

    fn video_metrics(&self, video: &NodeId) -> VideoMetrics {
        self.inner
            .read()
            .nodes
            .get(*video)
            .map(|n| n.metrics)
            .unwrap_or_default()
    }

    fn script_texts(&self) -> Vec<String> {
        let inner = self.inner.read();
        inner
            .descendants(inner.document)
            .into_iter()
            .filter(|id| inner.nodes[*id].tag() == Some("script"))
            .map(|id| inner.text_content(id))
            .collect()
    }
}

impl MutationSource for PageDom {
    fn observe(&self, root: &NodeId, options: ObserveOptions) -> UnboundedReceiver<MutationBatch<NodeId>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.write().observers.push(Observer {
            root: *root,
            options,
            tx,
        });
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page_url() -> Url {
        Url::parse("https://www.example.com/watch").unwrap()
    }

    #[test]
    fn imports_videos_scripts_and_shadow_roots() {
        let html = r#"
            <html><head><script>var a = 1;</script></head>
            <body>
              <div id="wrap"><video id="main"></video></div>
              <x-player id="host">
                <template shadowrootmode="open"><div><video id="inner"></video></div></template>
              </x-player>
              <x-locked><template shadowrootmode="closed"><video id="hidden"></video></template></x-locked>
              <template><video id="inert"></video></template>
              <script>window.data = {"video_url":"x"};</script>
            </body></html>"#;
        let dom = PageDom::from_html(html, Some(&page_url()));

        let main = dom.element_by_id("main").unwrap();
        assert_eq!(dom.videos(&dom.body()), vec![main]);
        assert!(dom.element_by_id("inert").is_none());

        let containers = dom.containers(&dom.body());
        assert_eq!(containers.len(), 1, "closed roots stay hidden: {:?}", containers);
        let Traversable::Shadow(shadow) = containers[0] else {
            panic!("expected a shadow root, got {:?}", containers[0]);
        };
        assert_eq!(dom.videos(&shadow), vec![dom.element_by_id("inner").unwrap()]);

        assert_eq!(
            dom.script_texts(),
            vec!["var a = 1;".to_string(), r#"window.data = {"video_url":"x"};"#.to_string()]
        );
    }

    #[test]
    fn classifies_frames_by_origin() {
        let html = r#"<body>
            <iframe id="doc" srcdoc="<video id='framed'></video>"></iframe>
            <iframe id="same" src="/embed/1"></iframe>
            <iframe id="foreign" src="https://player.other.net/embed/1"></iframe>
            <iframe id="blank"></iframe>
        </body>"#;
        let dom = PageDom::from_html(html, Some(&page_url()));

        let frames: Vec<_> = dom
            .containers(&dom.body())
            .into_iter()
            .filter_map(|c| match c {
                Traversable::Frame(access) => Some(access),
                _ => None,
            })
            .collect();

        assert_eq!(frames.len(), 4);
        let FrameAccess::SameOrigin(body) = frames[0] else {
            panic!("srcdoc frame should be readable: {:?}", frames[0]);
        };
        assert_eq!(dom.videos(&body), vec![dom.element_by_id("framed").unwrap()]);
        assert_eq!(frames[1], FrameAccess::Unloaded);
        assert_eq!(
            frames[2],
            FrameAccess::CrossOrigin {
                src: "https://player.other.net/embed/1".to_string()
            }
        );
        assert_eq!(frames[3], FrameAccess::Unloaded);
    }

    #[test]
    fn attach_overlay_positions_parent_and_marks_control() {
        let dom = PageDom::new();
        let wrap = dom.append_element(dom.body(), "div");
        let video = dom.append_video(wrap, VideoMetrics::new(640, 360, 5.0));

        let overlay = dom
            .attach_overlay(&video, &OverlaySpec::default(), OverlayHandler::new(|_, _| {}))
            .unwrap()
            .into_node();

        assert_eq!(dom.parent(overlay), Some(wrap));
        assert!(dom.has_class(overlay, "video-saver-btn"));
        assert_eq!(dom.attribute(wrap, "style").as_deref(), Some("position: relative"));
        assert_eq!(dom.overlay_for(&video), Some(overlay));
        assert_eq!(dom.overlay_target(overlay), Some(video));
    }

    #[test]
    fn attaching_twice_returns_the_existing_control() {
        let dom = PageDom::new();
        let wrap = dom.append_element(dom.body(), "div");
        let video = dom.append_video(wrap, VideoMetrics::default());

        let first = dom.attach_overlay(&video, &OverlaySpec::default(), OverlayHandler::new(|_, _| {}));
        let Some(Attachment::Created(overlay)) = first else {
            panic!("first attach should create a control: {:?}", first);
        };
        let second = dom.attach_overlay(&video, &OverlaySpec::default(), OverlayHandler::new(|_, _| {}));

        assert_eq!(second, Some(Attachment::Existing(overlay)));
        let controls: Vec<NodeId> = dom
            .children(wrap)
            .into_iter()
            .filter(|c| dom.has_class(*c, "video-saver-btn"))
            .collect();
        assert_eq!(controls, vec![overlay]);
    }

    #[test]
    fn unknown_ids_leave_the_tree_untouched() {
        let dom = PageDom::new();
        let body = dom.body();
        let missing: NodeId = 10_000;

        dom.append_child(body, missing);
        dom.append_child(missing, body);
        dom.set_attribute(missing, "class", "x");
        dom.set_video_metrics(missing, VideoMetrics::new(1, 1, 1.0));
        dom.set_cross_origin_frame(missing, "https://other.example/");

        assert_eq!(dom.attach_shadow(missing, true), None);
        assert_eq!(dom.load_frame(missing), None);
        assert!(dom.videos(&missing).is_empty());
        assert!(dom.containers(&missing).is_empty());
        assert!(dom.children(body).is_empty());
        assert_eq!(dom.parent(missing), None);
        assert_eq!(dom.attribute(missing, "class"), None);
    }

    #[test]
    fn appending_an_ancestor_into_its_descendant_is_ignored() {
        let dom = PageDom::new();
        let outer = dom.append_element(dom.body(), "div");
        let inner = dom.append_element(outer, "div");

        dom.append_child(inner, outer);
        dom.append_child(outer, outer);

        assert_eq!(dom.parent(outer), Some(dom.body()));
        assert_eq!(dom.children(outer), vec![inner]);
    }

    #[test]
    fn explicit_position_is_left_alone() {
        let dom = PageDom::new();
        let wrap = dom.append_element(dom.body(), "div");
        dom.set_attribute(wrap, "style", "color: red; position: fixed");
        let video = dom.append_video(wrap, VideoMetrics::default());

        dom.attach_overlay(&video, &OverlaySpec::default(), OverlayHandler::new(|_, _| {}));

        assert_eq!(dom.attribute(wrap, "style").as_deref(), Some("color: red; position: fixed"));
    }

    #[test]
    fn removing_video_subtree_drops_its_control() {
        let dom = PageDom::new();
        let wrap = dom.append_element(dom.body(), "div");
        let video = dom.append_video(wrap, VideoMetrics::default());
        let overlay = dom
            .attach_overlay(&video, &OverlaySpec::default(), OverlayHandler::new(|_, _| {}))
            .unwrap()
            .into_node();

        dom.remove(video);

        assert!(dom.overlays().is_empty());
        assert_eq!(dom.parent(overlay), None);
        assert_eq!(dom.overlay_for(&video), None);
    }

    #[test]
    fn removing_control_frees_video_for_reannotation() {
        let dom = PageDom::new();
        let video = dom.append_video(dom.body(), VideoMetrics::default());
        let overlay = dom
            .attach_overlay(&video, &OverlaySpec::default(), OverlayHandler::new(|_, _| {}))
            .unwrap()
            .into_node();

        dom.remove(overlay);

        assert_eq!(dom.overlay_for(&video), None);
        assert!(!dom.click(overlay));
    }

    #[test]
    fn click_runs_handler_with_video() {
        let dom = PageDom::new();
        let video = dom.append_video(dom.body(), VideoMetrics::new(1280, 720, 3.0));
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let overlay = dom
            .attach_overlay(
                &video,
                &OverlaySpec::default(),
                OverlayHandler::new(move |dom: &PageDom, video: &NodeId| {
                    sink.lock().push(dom.video_metrics(video));
                }),
            )
            .unwrap()
            .into_node();

        assert!(dom.click(overlay));
        assert_eq!(*seen.lock(), vec![VideoMetrics::new(1280, 720, 3.0)]);
    }

    #[tokio::test]
    async fn observers_see_light_tree_changes_only() {
        let dom = PageDom::new();
        let host = dom.append_element(dom.body(), "div");
        let shadow = dom.attach_shadow(host, true).unwrap();
        let mut rx = dom.observe(&dom.body(), ObserveOptions::all());

        let child = dom.append_element(host, "span");
        dom.set_attribute(child, "class", "x");
        dom.append_element(shadow, "video");

        let first = rx.recv().await.unwrap();
        assert_eq!(first[0].target, host);
        assert_eq!(first[0].kind, MutationKind::ChildList);
        let second = rx.recv().await.unwrap();
        assert_eq!(second[0].kind, MutationKind::Attributes { name: "class".to_string() });
        assert!(rx.try_recv().is_err());
    }
}
