use serde::Serialize;

use super::dom::{DomTree, FrameAccess, OverlayHandler, OverlaySpec, Traversable};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ScanReport {
    pub videos_seen: usize,
    pub overlays_attached: usize,
    pub shadow_roots: usize,
    pub frames_entered: usize,
    pub frames_skipped: usize,
}

/// Finds videos under a root, across open shadow roots and same-origin
/// frames, and gives each one control.
pub struct Scanner<D: DomTree> {
    spec: OverlaySpec,
    handler: OverlayHandler<D>,
}

impl<D: DomTree> Scanner<D> {
    pub fn new(spec: OverlaySpec, handler: OverlayHandler<D>) -> Self {
        Self { spec, handler }
    }

    pub fn scan(&self, dom: &D, root: &D::Node) -> ScanReport {
        let mut report = ScanReport::default();
        let mut pending = vec![Traversable::Subtree(root.clone())];

        while let Some(container) = pending.pop() {
            let root = match container {
                Traversable::Subtree(node) => node,
                Traversable::Shadow(node) => {
                    report.shadow_roots += 1;
                    node
                }
                Traversable::Frame(FrameAccess::SameOrigin(body)) => {
                    report.frames_entered += 1;
                    body
                }
                Traversable::Frame(FrameAccess::Unloaded) => continue,
                Traversable::Frame(FrameAccess::CrossOrigin { src }) => {
                    tracing::trace!(%src, "skipping cross-origin frame");
                    report.frames_skipped += 1;
                    continue;
                }
            };

            for video in dom.videos(&root) {
                report.videos_seen += 1;
                let attached = dom.attach_overlay(&video, &self.spec, self.handler.clone());
                if attached.map_or(false, |a| a.is_created()) {
                    report.overlays_attached += 1;
                }
            }

            // Reverse so containers are visited in document order.
            let mut children = dom.containers(&root);
            children.reverse();
            pending.extend(children);
        }

        if report.overlays_attached > 0 {
            tracing::debug!(?report, "attached video controls");
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::snapshot::PageDom;
    use crate::discovery::VideoMetrics;

    fn scanner() -> Scanner<PageDom> {
        Scanner::new(OverlaySpec::default(), OverlayHandler::new(|_, _| {}))
    }

    #[test]
    fn repeated_scans_attach_one_control_per_video() {
        let dom = PageDom::new();
        let wrap = dom.append_element(dom.body(), "div");
        let first = dom.append_video(wrap, VideoMetrics::default());
        let second = dom.append_video(wrap, VideoMetrics::default());
        let scanner = scanner();

        let initial = scanner.scan(&dom, &dom.body());
        for _ in 0..5 {
            let again = scanner.scan(&dom, &dom.body());
            assert_eq!(again.overlays_attached, 0);
            assert_eq!(again.videos_seen, 2);
        }

        assert_eq!(initial.overlays_attached, 2);
        assert_eq!(dom.overlays().len(), 2);
        assert_ne!(dom.overlay_for(&first), dom.overlay_for(&second));
    }

    #[test]
    fn descends_into_shadow_roots_and_same_origin_frames() {
        let html = r#"<body>
            <video id="top"></video>
            <x-player><template shadowrootmode="open"><div><video id="shadowed"></video></div></template></x-player>
            <iframe srcdoc="<div><video id='framed'></video></div>"></iframe>
            <iframe src="https://ads.other.net/player"></iframe>
        </body>"#;
        let url = url::Url::parse("https://site.example/page").unwrap();
        let dom = PageDom::from_html(html, Some(&url));

        let report = scanner().scan(&dom, &dom.body());

        assert_eq!(
            report,
            ScanReport {
                videos_seen: 3,
                overlays_attached: 3,
                shadow_roots: 1,
                frames_entered: 1,
                frames_skipped: 1,
            }
        );
        for id in ["top", "shadowed", "framed"] {
            let video = dom.element_by_id(id).unwrap();
            assert!(dom.overlay_for(&video).is_some(), "{} has no control", id);
        }
    }

    #[test]
    fn videos_added_later_are_picked_up() {
        let dom = PageDom::new();
        let scanner = scanner();
        dom.append_video(dom.body(), VideoMetrics::default());
        scanner.scan(&dom, &dom.body());

        let host = dom.append_element(dom.body(), "section");
        let shadow = dom.attach_shadow(host, true).unwrap();
        let late = dom.append_video(shadow, VideoMetrics::default());
        let report = scanner.scan(&dom, &dom.body());

        assert_eq!(report.overlays_attached, 1);
        assert!(dom.overlay_for(&late).is_some());
    }

    #[test]
    fn concurrent_scans_keep_one_control_per_video() {
        for _ in 0..50 {
            let dom = PageDom::new();
            let wraps: Vec<_> = (0..20)
                .map(|_| {
                    let wrap = dom.append_element(dom.body(), "div");
                    dom.append_video(wrap, VideoMetrics::default());
                    wrap
                })
                .collect();
            let scanner = scanner();

            let attached: usize = std::thread::scope(|s| {
                let workers: Vec<_> = (0..4)
                    .map(|_| s.spawn(|| scanner.scan(&dom, &dom.body()).overlays_attached))
                    .collect();
                workers.into_iter().map(|w| w.join().unwrap()).sum()
            });

            assert_eq!(attached, 20);
            for wrap in wraps {
                let controls = dom
                    .children(wrap)
                    .into_iter()
                    .filter(|c| dom.has_class(*c, "video-saver-btn"))
                    .count();
                assert_eq!(controls, 1);
            }
        }
    }

    #[test]
    fn detached_video_gets_no_control() {
        let dom = PageDom::new();
        let orphan = dom.create_element("video");

        let attached = dom.attach_overlay(&orphan, &OverlaySpec::default(), OverlayHandler::new(|_, _| {}));

        assert!(attached.is_none());
    }
}
