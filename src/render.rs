//! # Render Reconciler
//!
//! [`render`] turns a message list into a [`ViewModel`] without touching any
//! UI. [`Reconciler`] pushes view models to a host [`Surface`], skipping
//! redraws of an identical view and following new messages only when the
//! viewer was already scrolled to the bottom.

use std::collections::HashSet;

use crate::color::{Color, ColorAssigner};
use crate::gate::Actions;
use crate::models::{ChatMessage, MessageId};

/// One message as displayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageView {
    pub id: MessageId,
    pub nick: String,
    pub text: String,
    pub timestamp: String,
    pub color: Color,
    pub actions: Actions,
}

impl MessageView {
    /// `nick - (id): timestamp`
    pub fn header(&self) -> String {
        format!("{} - ({}): {}", self.nick, self.id, self.timestamp)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ViewModel {
    pub messages: Vec<MessageView>,
    /// Persistent system notice shown below the messages.
    pub notice: Option<String>,
}

/// Build the view for `messages` in server order.
pub fn render(
    messages: &[ChatMessage],
    authorized: &HashSet<MessageId>,
    colors: &ColorAssigner,
    notice: Option<&str>,
) -> ViewModel {
    let messages = messages
        .iter()
        .map(|m| MessageView {
            id: m.id.clone(),
            nick: m.nick.clone(),
            text: m.text.clone(),
            timestamp: m.timestamp.to_string(),
            color: colors.color_for(&m.nick, m.id.as_str()),
            actions: if authorized.contains(&m.id) { Actions::ALL } else { Actions::NONE },
        })
        .collect();
    ViewModel {
        messages,
        notice: notice.map(str::to_string),
    }
}

/// Scroll geometry of the host view, in pixels (or rows).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScrollMetrics {
    pub offset: u32,
    pub viewport: u32,
    pub content: u32,
}

impl ScrollMetrics {
    pub fn distance_from_bottom(&self) -> u32 {
        self.content.saturating_sub(self.offset.saturating_add(self.viewport))
    }

    pub fn is_at_bottom(&self, tolerance: u32) -> bool {
        self.distance_from_bottom() <= tolerance
    }
}

/// What the host UI must provide.
pub trait Surface {
    fn metrics(&self) -> ScrollMetrics;
    fn draw(&mut self, view: &ViewModel);
    fn scroll_to_bottom(&mut self);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderState {
    pub last: Option<ViewModel>,
    pub at_bottom: bool,
}

impl Default for RenderState {
    fn default() -> Self {
        Self {
            last: None,
            at_bottom: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    /// Identical to the last view; the surface was not touched.
    Unchanged,
    Redrawn { followed: bool },
}

#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    state: RenderState,
    tolerance: u32,
}

impl Reconciler {
    pub fn new(tolerance: u32) -> Self {
        Self {
            state: RenderState::default(),
            tolerance,
        }
    }

    pub fn state(&self) -> &RenderState {
        &self.state
    }

    pub fn reconcile<S: Surface + ?Sized>(&mut self, surface: &mut S, view: ViewModel) -> RenderOutcome {
        if self.state.last.as_ref() == Some(&view) {
            return RenderOutcome::Unchanged;
        }

        let at_bottom = surface.metrics().is_at_bottom(self.tolerance);
        surface.draw(&view);
        if at_bottom {
            surface.scroll_to_bottom();
        }

        self.state.at_bottom = at_bottom;
        self.state.last = Some(view);
        RenderOutcome::Redrawn { followed: at_bottom }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::ColorStrategy;
    use crate::models::parse_feed;
    use rstest::rstest;

    /// Surface that lays every message out as 40 px and counts mutations.
    #[derive(Default)]
    struct CountingSurface {
        metrics: ScrollMetrics,
        draws: usize,
        scrolls: usize,
    }

    impl CountingSurface {
        fn with_viewport(viewport: u32) -> Self {
            Self {
                metrics: ScrollMetrics { offset: 0, viewport, content: 0 },
                ..Default::default()
            }
        }
    }

    impl Surface for CountingSurface {
        fn metrics(&self) -> ScrollMetrics {
            self.metrics
        }
        fn draw(&mut self, view: &ViewModel) {
            self.draws += 1;
            self.metrics.content = view.messages.len() as u32 * 40;
        }
        fn scroll_to_bottom(&mut self) {
            self.scrolls += 1;
            self.metrics.offset = self.metrics.content.saturating_sub(self.metrics.viewport);
        }
    }

    fn view_of(raw: &str) -> ViewModel {
        let msgs = parse_feed(raw).unwrap();
        render(&msgs, &HashSet::new(), &ColorAssigner::new(ColorStrategy::Hashed), None)
    }

    fn feed(n: usize) -> String {
        let items: Vec<String> = (0..n)
            .map(|i| format!(r#"{{"nick":"u{i}","id":{i},"msg":"m{i}","timestamp":"T{i}"}}"#))
            .collect();
        format!("[{}]", items.join(","))
    }

    #[test]
    fn render_preserves_order_and_fields() {
        let view = view_of(&feed(3));
        assert_eq!(view.messages.len(), 3);
        assert_eq!(view.messages[2].nick, "u2");
        assert_eq!(view.messages[2].header(), "u2 - (2): T2");
        assert!(view.notice.is_none());
    }

    #[test]
    fn render_marks_only_authorized_ids() {
        let msgs = parse_feed(&feed(3)).unwrap();
        let authorized: HashSet<_> = [MessageId::new("1")].into_iter().collect();
        let view = render(&msgs, &authorized, &ColorAssigner::default(), None);
        assert_eq!(view.messages[0].actions, Actions::NONE);
        assert_eq!(view.messages[1].actions, Actions::ALL);
        assert_eq!(view.messages[2].actions, Actions::NONE);
    }

    #[test]
    fn render_uses_color_assigner() {
        let msgs = parse_feed(&feed(1)).unwrap();
        let colors = ColorAssigner::new(ColorStrategy::Palette);
        let view = render(&msgs, &HashSet::new(), &colors, None);
        assert_eq!(view.messages[0].color, colors.color_for("u0", "0"));
    }

    #[test]
    fn identical_payload_causes_zero_mutations() {
        let mut surface = CountingSurface::with_viewport(200);
        let mut rec = Reconciler::new(8);
        let raw = r#"[{"id":1,"nick":"a","msg":"hi","timestamp":"T1"}]"#;

        assert!(matches!(rec.reconcile(&mut surface, view_of(raw)), RenderOutcome::Redrawn { .. }));
        let (draws, scrolls) = (surface.draws, surface.scrolls);

        assert_eq!(rec.reconcile(&mut surface, view_of(raw)), RenderOutcome::Unchanged);
        assert_eq!(surface.draws, draws);
        assert_eq!(surface.scrolls, scrolls);
    }

    #[test]
    fn viewer_at_bottom_stays_at_bottom() {
        let mut surface = CountingSurface::with_viewport(200);
        let mut rec = Reconciler::new(8);
        rec.reconcile(&mut surface, view_of(&feed(10)));
        assert!(surface.metrics.is_at_bottom(0));

        let outcome = rec.reconcile(&mut surface, view_of(&feed(12)));
        assert_eq!(outcome, RenderOutcome::Redrawn { followed: true });
        assert!(surface.metrics.is_at_bottom(0));
    }

    #[test]
    fn viewer_scrolled_up_keeps_offset() {
        let mut surface = CountingSurface::with_viewport(200);
        let mut rec = Reconciler::new(8);
        rec.reconcile(&mut surface, view_of(&feed(10)));

        surface.metrics.offset = 50; // scrolled well above the bottom (content 400)
        let outcome = rec.reconcile(&mut surface, view_of(&feed(12)));
        assert_eq!(outcome, RenderOutcome::Redrawn { followed: false });
        assert_eq!(surface.metrics.offset, 50);
        assert!(!rec.state().at_bottom);
    }

    #[test]
    fn within_tolerance_counts_as_bottom() {
        let mut surface = CountingSurface::with_viewport(200);
        let mut rec = Reconciler::new(8);
        rec.reconcile(&mut surface, view_of(&feed(10)));

        surface.metrics.offset -= 5;
        let outcome = rec.reconcile(&mut surface, view_of(&feed(11)));
        assert_eq!(outcome, RenderOutcome::Redrawn { followed: true });
    }

    #[rstest]
    #[case(0, true)]
    #[case(8, true)]
    #[case(9, false)]
    fn tolerance_boundary(#[case] above_bottom: u32, #[case] follows: bool) {
        let mut surface = CountingSurface::with_viewport(200);
        let mut rec = Reconciler::new(8);
        rec.reconcile(&mut surface, view_of(&feed(10)));

        surface.metrics.offset -= above_bottom;
        assert_eq!(surface.metrics.distance_from_bottom(), above_bottom);
        let outcome = rec.reconcile(&mut surface, view_of(&feed(11)));
        assert_eq!(outcome, RenderOutcome::Redrawn { followed: follows });
        assert_eq!(surface.scrolls, if follows { 2 } else { 1 });
    }

    #[test]
    fn notice_change_forces_redraw() {
        let mut surface = CountingSurface::with_viewport(200);
        let mut rec = Reconciler::new(8);
        let msgs = parse_feed(&feed(2)).unwrap();
        let colors = ColorAssigner::default();
        rec.reconcile(&mut surface, render(&msgs, &HashSet::new(), &colors, None));
        let outcome = rec.reconcile(&mut surface, render(&msgs, &HashSet::new(), &colors, Some("expired")));
        assert!(matches!(outcome, RenderOutcome::Redrawn { .. }));
        assert_eq!(surface.draws, 2);
    }

    #[test]
    fn metrics_distance_saturates() {
        let m = ScrollMetrics { offset: 500, viewport: 200, content: 100 };
        assert_eq!(m.distance_from_bottom(), 0);
        assert!(m.is_at_bottom(0));
    }
}
