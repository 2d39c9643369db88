use crate::{
    config::FormatTouchPolicy,
    render::{Screen, ScreenKind},
    snapshot::Snapshot,
};
use log::{debug, info};
use serde::Serialize;
use std::time::{Duration, Instant};

/// Minimum time between two accepted touches
pub const DEBOUNCE: Duration = Duration::from_millis(300);

const DEFAULT_ALERT_REASON: &str = "Tape change needed";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tab {
    #[default]
    Dashboard,
    Jobs,
    Drives,
}

impl Tab {
    pub const ALL: [Tab; 3] = [Tab::Dashboard, Tab::Jobs, Tab::Drives];

    pub fn from_index(index: usize) -> Option<Tab> {
        Self::ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn title(self) -> &'static str {
        match self {
            Tab::Dashboard => "Dashboard",
            Tab::Jobs => "Jobs",
            Tab::Drives => "Drives",
        }
    }
}

/// What an accepted or rejected touch resulted in
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TouchAction {
    /// Rejected by the debounce window
    Ignored,
    /// Accepted without any visible effect
    Consumed,
    DismissAlert,
    DismissFormat,
    SwitchTab(Tab),
}

impl TouchAction {
    pub fn needs_refresh(self) -> bool {
        matches!(
            self,
            TouchAction::DismissAlert | TouchAction::DismissFormat | TouchAction::SwitchTab(_)
        )
    }
}

#[derive(Debug, Default)]
pub struct NavigationController {
    active_tab: Tab,
    last_touch: Option<Instant>,
    format_dismissed: bool,
}

impl NavigationController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_tab(&self) -> Tab {
        self.active_tab
    }

    /// Interpret a touch given the screen currently on display
    ///
    /// `tab_hit` is the tab under the touch point, if any.
    pub fn handle_touch(
        &mut self,
        now: Instant,
        displayed: Option<ScreenKind>,
        tab_hit: Option<Tab>,
        policy: FormatTouchPolicy,
    ) -> TouchAction {
        if let Some(last) = self.last_touch
            && now.saturating_duration_since(last) < DEBOUNCE
        {
            debug!("touch ignored within debounce window");
            return TouchAction::Ignored;
        }
        self.last_touch = Some(now);

        match displayed {
            Some(ScreenKind::TapeAlert) => TouchAction::DismissAlert,
            Some(ScreenKind::FormatProgress) => match policy {
                FormatTouchPolicy::Ignore => TouchAction::Consumed,
                FormatTouchPolicy::Dismiss => {
                    info!("format progress screen dismissed");
                    self.format_dismissed = true;
                    TouchAction::DismissFormat
                }
            },
            _ => match tab_hit {
                Some(tab) if tab != self.active_tab => {
                    debug!("switching to {} tab", tab.title());
                    self.active_tab = tab;
                    TouchAction::SwitchTab(tab)
                }
                _ => TouchAction::Consumed,
            },
        }
    }

    /// Switch to the jobs tab once when jobs appear, returns whether it switched
    pub fn observe_jobs(&mut self, previous_count: usize, current_count: usize) -> bool {
        if previous_count == 0 && current_count > 0 && self.active_tab != Tab::Jobs {
            info!("jobs started, switching to jobs tab");
            self.active_tab = Tab::Jobs;
            return true;
        }
        false
    }

    /// Re-arm the format screen once no format job is running
    pub fn observe_format(&mut self, active: bool) {
        if !active {
            self.format_dismissed = false;
        }
    }

    /// Pick the data screen to show: alert, then format progress, then the active tab
    pub fn select_screen(&self, alert_shown: bool, snapshot: &Snapshot) -> Screen {
        if alert_shown {
            let reason = snapshot
                .tape_changes()
                .first()
                .map(|change| change.reason.to_string())
                .unwrap_or_else(|| DEFAULT_ALERT_REASON.to_string());
            return Screen::TapeAlert { reason };
        }

        if let Some(progress) = snapshot.active_format()
            && !self.format_dismissed
        {
            return Screen::FormatProgress(progress.clone());
        }

        match self.active_tab {
            Tab::Dashboard => {
                Screen::Dashboard(snapshot.dashboard.value().cloned().unwrap_or_default())
            }
            Tab::Jobs => Screen::Jobs(snapshot.jobs().to_vec()),
            Tab::Drives => Screen::Drives(snapshot.drives().to_vec()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        model::{FormatProgress, JobInfo, PendingTapeChange, TapeChangeReason, TapeChangeStatus},
        poll::PollReport,
        snapshot::SnapshotCache,
    };

    fn snapshot(pending: bool, format_active: bool) -> std::sync::Arc<Snapshot> {
        let mut cache = SnapshotCache::new();
        cache.apply(PollReport {
            dashboard: Ok(Default::default()),
            jobs: Ok(vec![JobInfo::default()]),
            drives: Ok(vec![]),
            tape_changes: Ok(if pending {
                vec![PendingTapeChange {
                    id: 1,
                    reason: TapeChangeReason::TapeFull,
                    status: TapeChangeStatus::Pending,
                    current_tape_id: 4,
                }]
            } else {
                vec![]
            }),
            format_status: Ok(format_active.then(|| FormatProgress {
                active: true,
                progress_percent: 60,
                ..Default::default()
            })),
        });
        cache.current()
    }

    mod touch {
        use super::*;

        #[test]
        fn second_touch_within_window_is_ignored() {
            let mut nav = NavigationController::new();
            let start = Instant::now();

            assert_eq!(
                nav.handle_touch(
                    start,
                    Some(ScreenKind::Dashboard),
                    Some(Tab::Jobs),
                    FormatTouchPolicy::Ignore
                ),
                TouchAction::SwitchTab(Tab::Jobs)
            );
            assert_eq!(
                nav.handle_touch(
                    start + Duration::from_millis(100),
                    Some(ScreenKind::Jobs),
                    Some(Tab::Drives),
                    FormatTouchPolicy::Ignore
                ),
                TouchAction::Ignored
            );
            assert_eq!(nav.active_tab(), Tab::Jobs);
        }

        #[test]
        fn touch_after_window_is_accepted() {
            let mut nav = NavigationController::new();
            let start = Instant::now();

            nav.handle_touch(
                start,
                Some(ScreenKind::Dashboard),
                Some(Tab::Jobs),
                FormatTouchPolicy::Ignore,
            );
            assert_eq!(
                nav.handle_touch(
                    start + Duration::from_millis(301),
                    Some(ScreenKind::Jobs),
                    Some(Tab::Drives),
                    FormatTouchPolicy::Ignore
                ),
                TouchAction::SwitchTab(Tab::Drives)
            );
        }

        #[test]
        fn ignored_touch_does_not_extend_window() {
            let mut nav = NavigationController::new();
            let start = Instant::now();
            let screen = Some(ScreenKind::Dashboard);

            nav.handle_touch(start, screen, None, FormatTouchPolicy::Ignore);
            nav.handle_touch(
                start + Duration::from_millis(200),
                screen,
                None,
                FormatTouchPolicy::Ignore,
            );
            assert_eq!(
                nav.handle_touch(
                    start + Duration::from_millis(300),
                    screen,
                    Some(Tab::Drives),
                    FormatTouchPolicy::Ignore
                ),
                TouchAction::SwitchTab(Tab::Drives)
            );
        }

        #[test]
        fn tapping_active_tab_does_nothing() {
            let mut nav = NavigationController::new();
            assert_eq!(
                nav.handle_touch(
                    Instant::now(),
                    Some(ScreenKind::Dashboard),
                    Some(Tab::Dashboard),
                    FormatTouchPolicy::Ignore
                ),
                TouchAction::Consumed
            );
        }

        #[test]
        fn touch_on_alert_dismisses_and_keeps_tab() {
            let mut nav = NavigationController::new();
            let action = nav.handle_touch(
                Instant::now(),
                Some(ScreenKind::TapeAlert),
                Some(Tab::Drives),
                FormatTouchPolicy::Ignore,
            );
            assert_eq!(action, TouchAction::DismissAlert);
            assert!(action.needs_refresh());
            assert_eq!(nav.active_tab(), Tab::Dashboard);
        }

        #[test]
        fn format_touch_follows_policy() {
            let mut nav = NavigationController::new();
            let start = Instant::now();
            let snapshot = snapshot(false, true);

            assert_eq!(
                nav.handle_touch(
                    start,
                    Some(ScreenKind::FormatProgress),
                    Some(Tab::Jobs),
                    FormatTouchPolicy::Ignore
                ),
                TouchAction::Consumed
            );
            assert_eq!(nav.select_screen(false, &snapshot).kind(), ScreenKind::FormatProgress);

            assert_eq!(
                nav.handle_touch(
                    start + DEBOUNCE,
                    Some(ScreenKind::FormatProgress),
                    None,
                    FormatTouchPolicy::Dismiss
                ),
                TouchAction::DismissFormat
            );
            assert_eq!(nav.select_screen(false, &snapshot).kind(), ScreenKind::Dashboard);

            nav.observe_format(false);
            assert_eq!(nav.select_screen(false, &snapshot).kind(), ScreenKind::FormatProgress);
        }
    }

    mod precedence {
        use super::*;

        #[test]
        fn alert_beats_format_and_tab() {
            let nav = NavigationController::new();
            match nav.select_screen(true, &snapshot(true, true)) {
                Screen::TapeAlert { reason } => assert_eq!(reason, "tape full"),
                other => panic!("unexpected screen: {other:?}"),
            }
        }

        #[test]
        fn format_beats_tab() {
            let nav = NavigationController::new();
            assert_eq!(
                nav.select_screen(false, &snapshot(false, true)).kind(),
                ScreenKind::FormatProgress
            );
        }

        #[test]
        fn active_tab_without_alert_or_format() {
            let mut nav = NavigationController::new();
            nav.observe_jobs(0, 1);
            assert_eq!(
                nav.select_screen(false, &snapshot(true, false)).kind(),
                ScreenKind::Jobs
            );
        }
    }

    mod auto_switch {
        use super::*;

        #[test]
        fn switches_to_jobs_when_jobs_appear() {
            let mut nav = NavigationController::new();
            assert!(nav.observe_jobs(0, 2));
            assert_eq!(nav.active_tab(), Tab::Jobs);
        }

        #[test]
        fn does_not_switch_while_jobs_keep_running() {
            let mut nav = NavigationController::new();
            nav.observe_jobs(0, 1);
            nav.handle_touch(
                Instant::now(),
                Some(ScreenKind::Jobs),
                Some(Tab::Drives),
                FormatTouchPolicy::Ignore,
            );

            assert!(!nav.observe_jobs(1, 2));
            assert_eq!(nav.active_tab(), Tab::Drives);
        }
    }
}
