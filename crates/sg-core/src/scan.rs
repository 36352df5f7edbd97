//! Client-side scan state machine
//!
//! Replaces the ad hoc timer/flag soup a content script naturally grows
//! with an explicit finite-state machine. The driver (the wasm agent) owns
//! the DOM and the relay; this machine owns the decision about what happens
//! next. Every transition returns the list of effects the driver must
//! perform, so a debounced rescan can only be reasoned about as a state
//! transition, never as an incidental timer race.
//!
//! ```text
//! Idle -> Prechecking -> (Blocked | Scanning) -> (Blocked | Safe)
//! ```
//!
//! `Blocked` is terminal for the page lifetime. `Safe` is re-entered on DOM
//! mutation (SPA navigation). Debounce cancellation is by generation
//! counter: re-arming bumps the generation, and a timer that fires with a
//! stale generation is ignored (last-write-wins, nothing queues).

/// Initial debounce before the first full scan, in ms.
pub const INITIAL_SCAN_DELAY_MS: u32 = 1_500;
/// Debounce after a DOM mutation re-arm, in ms.
pub const MUTATION_SCAN_DELAY_MS: u32 = 3_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Prechecking,
    Scanning,
    Blocked,
    Safe,
}

/// Inputs fed by the driver.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanEvent {
    /// Page finished loading enough to start (agent configured + enabled).
    PageLoaded,
    /// URL precheck came back from the relay.
    PrecheckResult { blocked: bool, reason: Option<String> },
    /// A scheduled debounce timer fired, carrying the generation it was
    /// armed with.
    DebounceFired { generation: u32 },
    /// Extraction found nothing worth a backend round trip.
    ScanSkipped,
    /// Combined page scan came back from the relay.
    ScanResult { blocked: bool, reason: Option<String> },
    /// The mutation observer saw a significant DOM change.
    DomMutated,
}

/// Work the driver must perform after a transition, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanEffect {
    /// Apply the default-safe mutation (blur candidate images).
    BlurImages,
    /// Ask the relay for a URL-only precheck.
    RequestPrecheck,
    /// Arm (or re-arm) the debounce timer with this generation.
    ScheduleScan { delay_ms: u32, generation: u32 },
    /// Extract page content and ask the relay for a combined scan.
    RequestScan,
    /// Replace the page with the block interstitial.
    ShowBlockScreen { reason: String },
    /// Reverse the default-safe mutation.
    Unblur,
}

pub struct ScanMachine {
    state: ScanState,
    generation: u32,
}

impl Default for ScanMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanMachine {
    pub fn new() -> Self {
        Self {
            state: ScanState::Idle,
            generation: 0,
        }
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    /// Generation of the most recently armed debounce.
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Feed one event; returns the effects to perform.
    pub fn handle(&mut self, event: ScanEvent) -> Vec<ScanEffect> {
        // Terminal: once blocked, no client event re-opens the page.
        if self.state == ScanState::Blocked {
            return Vec::new();
        }

        match (self.state, event) {
            (ScanState::Idle, ScanEvent::PageLoaded) => {
                self.state = ScanState::Prechecking;
                vec![ScanEffect::BlurImages, ScanEffect::RequestPrecheck]
            }

            (ScanState::Prechecking, ScanEvent::PrecheckResult { blocked: true, reason }) => {
                self.state = ScanState::Blocked;
                vec![ScanEffect::ShowBlockScreen {
                    reason: reason.unwrap_or_else(|| "unsafe_url".to_string()),
                }]
            }

            (ScanState::Prechecking, ScanEvent::PrecheckResult { blocked: false, .. }) => {
                self.state = ScanState::Scanning;
                self.generation += 1;
                vec![ScanEffect::ScheduleScan {
                    delay_ms: INITIAL_SCAN_DELAY_MS,
                    generation: self.generation,
                }]
            }

            // Mutations during precheck keep the safety default fresh; the
            // scan schedule starts only once the precheck passes.
            (ScanState::Prechecking, ScanEvent::DomMutated) => vec![ScanEffect::BlurImages],

            (ScanState::Scanning, ScanEvent::DebounceFired { generation }) => {
                if generation == self.generation {
                    vec![ScanEffect::RequestScan]
                } else {
                    // Stale timer from before a re-arm; superseded.
                    Vec::new()
                }
            }

            (ScanState::Scanning, ScanEvent::ScanResult { blocked: true, reason }) => {
                self.state = ScanState::Blocked;
                vec![ScanEffect::ShowBlockScreen {
                    reason: reason.unwrap_or_else(|| "content_violation".to_string()),
                }]
            }

            (ScanState::Scanning, ScanEvent::ScanResult { blocked: false, .. })
            | (ScanState::Scanning, ScanEvent::ScanSkipped) => {
                self.state = ScanState::Safe;
                vec![ScanEffect::Unblur]
            }

            (ScanState::Scanning, ScanEvent::DomMutated)
            | (ScanState::Safe, ScanEvent::DomMutated) => {
                self.state = ScanState::Scanning;
                self.generation += 1;
                vec![
                    ScanEffect::BlurImages,
                    ScanEffect::ScheduleScan {
                        delay_ms: MUTATION_SCAN_DELAY_MS,
                        generation: self.generation,
                    },
                ]
            }

            // Everything else is a stale or out-of-order event.
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loaded_machine() -> ScanMachine {
        let mut m = ScanMachine::new();
        let fx = m.handle(ScanEvent::PageLoaded);
        assert_eq!(fx, vec![ScanEffect::BlurImages, ScanEffect::RequestPrecheck]);
        m
    }

    #[test]
    fn test_blocked_precheck_is_terminal() {
        let mut m = loaded_machine();
        let fx = m.handle(ScanEvent::PrecheckResult {
            blocked: true,
            reason: Some("manual_blocklist".into()),
        });
        assert_eq!(
            fx,
            vec![ScanEffect::ShowBlockScreen { reason: "manual_blocklist".into() }]
        );
        assert_eq!(m.state(), ScanState::Blocked);

        // No client event re-opens a blocked page
        assert!(m.handle(ScanEvent::DomMutated).is_empty());
        assert!(m
            .handle(ScanEvent::ScanResult { blocked: false, reason: None })
            .is_empty());
        assert_eq!(m.state(), ScanState::Blocked);
    }

    #[test]
    fn test_precheck_pass_schedules_scan() {
        let mut m = loaded_machine();
        let fx = m.handle(ScanEvent::PrecheckResult { blocked: false, reason: None });
        assert_eq!(
            fx,
            vec![ScanEffect::ScheduleScan {
                delay_ms: INITIAL_SCAN_DELAY_MS,
                generation: 1
            }]
        );
        assert_eq!(m.state(), ScanState::Scanning);
    }

    #[test]
    fn test_debounce_fires_current_generation_only() {
        let mut m = loaded_machine();
        m.handle(ScanEvent::PrecheckResult { blocked: false, reason: None });

        // Mutation re-arms with a new generation before the timer fires
        let fx = m.handle(ScanEvent::DomMutated);
        assert_eq!(
            fx,
            vec![
                ScanEffect::BlurImages,
                ScanEffect::ScheduleScan { delay_ms: MUTATION_SCAN_DELAY_MS, generation: 2 },
            ]
        );

        // The original timer fires late: stale, ignored
        assert!(m.handle(ScanEvent::DebounceFired { generation: 1 }).is_empty());

        // The re-armed timer fires: scan goes out
        assert_eq!(
            m.handle(ScanEvent::DebounceFired { generation: 2 }),
            vec![ScanEffect::RequestScan]
        );
    }

    #[test]
    fn test_safe_result_unblurs_and_allows_rescan() {
        let mut m = loaded_machine();
        m.handle(ScanEvent::PrecheckResult { blocked: false, reason: None });
        m.handle(ScanEvent::DebounceFired { generation: 1 });

        let fx = m.handle(ScanEvent::ScanResult { blocked: false, reason: None });
        assert_eq!(fx, vec![ScanEffect::Unblur]);
        assert_eq!(m.state(), ScanState::Safe);

        // SPA navigation re-enters scanning
        let fx = m.handle(ScanEvent::DomMutated);
        assert_eq!(m.state(), ScanState::Scanning);
        assert!(fx.contains(&ScanEffect::BlurImages));
    }

    #[test]
    fn test_blocked_scan_result_shows_interstitial() {
        let mut m = loaded_machine();
        m.handle(ScanEvent::PrecheckResult { blocked: false, reason: None });
        m.handle(ScanEvent::DebounceFired { generation: 1 });

        let fx = m.handle(ScanEvent::ScanResult {
            blocked: true,
            reason: Some("Violence".into()),
        });
        assert_eq!(fx, vec![ScanEffect::ShowBlockScreen { reason: "Violence".into() }]);
        assert_eq!(m.state(), ScanState::Blocked);
    }

    #[test]
    fn test_empty_extraction_resolves_safe_locally() {
        let mut m = loaded_machine();
        m.handle(ScanEvent::PrecheckResult { blocked: false, reason: None });
        m.handle(ScanEvent::DebounceFired { generation: 1 });

        let fx = m.handle(ScanEvent::ScanSkipped);
        assert_eq!(fx, vec![ScanEffect::Unblur]);
        assert_eq!(m.state(), ScanState::Safe);
    }

    #[test]
    fn test_missing_reason_gets_default_labels() {
        let mut m = loaded_machine();
        let fx = m.handle(ScanEvent::PrecheckResult { blocked: true, reason: None });
        assert_eq!(fx, vec![ScanEffect::ShowBlockScreen { reason: "unsafe_url".into() }]);

        let mut m2 = loaded_machine();
        m2.handle(ScanEvent::PrecheckResult { blocked: false, reason: None });
        m2.handle(ScanEvent::DebounceFired { generation: 1 });
        let fx = m2.handle(ScanEvent::ScanResult { blocked: true, reason: None });
        assert_eq!(
            fx,
            vec![ScanEffect::ShowBlockScreen { reason: "content_violation".into() }]
        );
    }

    #[test]
    fn test_mutation_during_precheck_only_reblurs() {
        let mut m = loaded_machine();
        let fx = m.handle(ScanEvent::DomMutated);
        assert_eq!(fx, vec![ScanEffect::BlurImages]);
        assert_eq!(m.state(), ScanState::Prechecking);
    }
}
