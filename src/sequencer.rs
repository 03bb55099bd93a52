//! Action sequencing
//!
//! Actions run strictly in order against one session. The target updates on
//! its own tick loop and never says when an input has been processed, so
//! every dispatching action is followed by its settle duration before the
//! next one starts. Settle times are per action; nothing here is a hidden
//! constant.

use std::fmt;
use std::time::Duration;

use crate::browser::{KeyDefinition, KeyPhase};
use crate::common::Result;
use crate::probe;
use crate::session::Session;

/// A single synthetic input directive
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    KeyDown {
        key: KeyDefinition,
        settle: Duration,
    },
    KeyUp {
        key: KeyDefinition,
        settle: Duration,
    },
    /// Down, optional hold, up
    Press {
        key: KeyDefinition,
        hold: Duration,
        settle: Duration,
    },
    Click {
        x: f64,
        y: f64,
        settle: Duration,
    },
    /// Navigate the session, then re-hook its globals
    Navigate {
        url: String,
        settle: Duration,
    },
    /// Pure delay
    Wait(Duration),
    /// Evaluate a script in the page
    Eval {
        script: String,
        settle: Duration,
    },
}

impl Action {
    pub fn press(key: KeyDefinition, settle: Duration) -> Self {
        Self::Press {
            key,
            hold: Duration::ZERO,
            settle,
        }
    }

    /// Delay after dispatch before the next action
    pub fn settle(&self) -> Duration {
        match self {
            Self::KeyDown { settle, .. }
            | Self::KeyUp { settle, .. }
            | Self::Press { settle, .. }
            | Self::Click { settle, .. }
            | Self::Navigate { settle, .. }
            | Self::Eval { settle, .. } => *settle,
            Self::Wait(_) => Duration::ZERO,
        }
    }

    /// Total time this action spends waiting
    pub fn duration(&self) -> Duration {
        match self {
            Self::Press { hold, settle, .. } => *hold + *settle,
            Self::Wait(d) => *d,
            other => other.settle(),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KeyDown { key, .. } => write!(f, "key_down {key}"),
            Self::KeyUp { key, .. } => write!(f, "key_up {key}"),
            Self::Press { key, hold, .. } if hold.is_zero() => write!(f, "press {key}"),
            Self::Press { key, hold, .. } => write!(f, "press {key} (hold {}ms)", hold.as_millis()),
            Self::Click { x, y, .. } => write!(f, "click ({x}, {y})"),
            Self::Navigate { url, .. } => write!(f, "navigate {url}"),
            Self::Wait(d) => write!(f, "wait {}ms", d.as_millis()),
            Self::Eval { .. } => write!(f, "eval"),
        }
    }
}

/// Executes action sequences against a session
#[derive(Debug, Clone)]
pub struct Sequencer {
    hook_wait: Duration,
    hook_poll: Duration,
}

impl Sequencer {
    /// `hook_wait`/`hook_poll` bound the re-hook after a navigate action
    pub fn new(hook_wait: Duration, hook_poll: Duration) -> Self {
        Self {
            hook_wait,
            hook_poll: hook_poll.max(Duration::from_millis(1)),
        }
    }

    /// Run `actions` in order; stops at the first failing action
    pub async fn run(&self, session: &mut Session, actions: &[Action]) -> Result<()> {
        for (index, action) in actions.iter().enumerate() {
            tracing::debug!(session = session.id(), index, %action, "Dispatching");
            self.dispatch(session, action).await?;

            let settle = action.settle();
            if !settle.is_zero() {
                tokio::time::sleep(settle).await;
            }
        }
        Ok(())
    }

    async fn dispatch(&self, session: &mut Session, action: &Action) -> Result<()> {
        match action {
            Action::KeyDown { key, .. } => session.page()?.dispatch_key(key, KeyPhase::Down).await,
            Action::KeyUp { key, .. } => session.page()?.dispatch_key(key, KeyPhase::Up).await,
            Action::Press { key, hold, .. } => {
                session.page()?.dispatch_key(key, KeyPhase::Down).await?;
                if !hold.is_zero() {
                    tokio::time::sleep(*hold).await;
                }
                session.page()?.dispatch_key(key, KeyPhase::Up).await
            }
            Action::Click { x, y, .. } => session.page()?.click(*x, *y).await,
            Action::Navigate { url, .. } => {
                session.navigate(url).await?;
                probe::rehook(session, self.hook_wait, self.hook_poll).await
            }
            Action::Wait(d) => {
                tokio::time::sleep(*d).await;
                Ok(())
            }
            Action::Eval { script, .. } => {
                session.page()?.evaluate(script).await?;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::mock::{Effect, MockApp, MockBrowser};
    use crate::common::config::{ConsoleConfig, Defaults, Viewport};
    use crate::probe::{Injector, ProbeSet};
    use crate::session::{SessionConfig, SessionController};
    use crate::verifier::{self, Checkpoint, Expectation};
    use serde_json::json;
    use std::sync::Arc;
    use tokio::time::Instant;

    fn key(name: &str) -> KeyDefinition {
        KeyDefinition::parse(name).unwrap()
    }

    async fn ready_session(controller: &SessionController) -> Session {
        let mut session = controller
            .open(SessionConfig {
                url: "http://localhost:8080/?agent=1".to_string(),
                viewport: Viewport::default(),
                navigation_timeout: Duration::from_secs(5),
            })
            .await
            .unwrap();
        let probes = ProbeSet::default().global("gameState");
        let injector = Injector::new(&Defaults::default(), &ConsoleConfig::default());
        injector.install(&mut session, &probes).await.unwrap();
        session.navigate_to_target().await.unwrap();
        injector.install(&mut session, &probes).await.unwrap();
        session
    }

    async fn snapshot(session: &mut Session) -> serde_json::Value {
        session
            .page()
            .unwrap()
            .call_runtime("snapshot", vec![json!(["gameState"])])
            .await
            .unwrap()
    }

    fn sequencer() -> Sequencer {
        Sequencer::new(Duration::from_secs(1), Duration::from_millis(10))
    }

    #[tokio::test(start_paused = true)]
    async fn test_actions_run_in_order_with_settle() {
        let app = MockApp::new()
            .global("gameState", json!({ "log": "" }))
            .tick(Duration::from_millis(20))
            .on_key_down("a", [Effect::set("gameState.log", "a")])
            .on_key_down("b", [Effect::set("gameState.log", "ab")]);
        let controller = SessionController::new(Arc::new(MockBrowser::new(app)));
        let mut session = ready_session(&controller).await;

        let settle = Duration::from_millis(50);
        let actions = vec![
            Action::press(key("a"), settle),
            Action::Wait(Duration::from_millis(100)),
            Action::press(key("b"), settle),
        ];

        let started = Instant::now();
        sequencer().run(&mut session, &actions).await.unwrap();
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(200) && elapsed < Duration::from_millis(210));

        assert_eq!(snapshot(&mut session).await["gameState"]["log"], json!("ab"));
        controller.close(session).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_press_holds_between_down_and_up() {
        let app = MockApp::new()
            .global("gameState", json!({ "held": false }))
            .on_key_down("Shift", [Effect::set("gameState.held", true)])
            .on_key_up("Shift", [Effect::set("gameState.held", false)]);
        let controller = SessionController::new(Arc::new(MockBrowser::new(app)));
        let mut session = ready_session(&controller).await;

        let hold = Action::Press {
            key: key("shift"),
            hold: Duration::from_millis(300),
            settle: Duration::from_millis(10),
        };
        assert_eq!(hold.duration(), Duration::from_millis(310));

        let started = Instant::now();
        sequencer().run(&mut session, &[hold]).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(310));
        assert_eq!(snapshot(&mut session).await["gameState"]["held"], json!(false));
        controller.close(session).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_key_down_without_up_keeps_state() {
        let app = MockApp::new()
            .global("gameState", json!({ "held": false }))
            .on_key_down("Shift", [Effect::set("gameState.held", true)])
            .on_key_up("Shift", [Effect::set("gameState.held", false)]);
        let controller = SessionController::new(Arc::new(MockBrowser::new(app)));
        let mut session = ready_session(&controller).await;

        let actions = vec![Action::KeyDown {
            key: key("shift"),
            settle: Duration::from_millis(10),
        }];
        sequencer().run(&mut session, &actions).await.unwrap();
        assert_eq!(snapshot(&mut session).await["gameState"]["held"], json!(true));
        controller.close(session).await.unwrap();
    }

    #[tokio::test]
    async fn test_failing_action_stops_sequence() {
        let app = MockApp::new()
            .global("gameState", json!({ "n": 0 }))
            .on_key_down("b", [Effect::increment("gameState.n", 1.0)])
            .fail_on_key("x");
        let controller = SessionController::new(Arc::new(MockBrowser::new(app)));
        let mut session = ready_session(&controller).await;

        let actions = vec![
            Action::press(key("x"), Duration::ZERO),
            Action::press(key("b"), Duration::ZERO),
        ];
        let err = sequencer().run(&mut session, &actions).await.unwrap_err();
        assert!(matches!(err, crate::Error::Session(_)));
        assert_eq!(snapshot(&mut session).await["gameState"]["n"], json!(0));
        controller.close(session).await.unwrap();
    }

    #[tokio::test]
    async fn test_navigate_rehooks_globals() {
        let app = MockApp::new().global("gameState", json!({ "scene": "menu" }));
        let controller = SessionController::new(Arc::new(MockBrowser::new(app)));
        let mut session = ready_session(&controller).await;

        let actions = vec![Action::Navigate {
            url: "/play".to_string(),
            settle: Duration::ZERO,
        }];
        sequencer().run(&mut session, &actions).await.unwrap();
        assert_eq!(session.hooked_globals(), vec!["gameState".to_string()]);
        controller.close(session).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_click_and_eval_reach_the_page() {
        let app = MockApp::new()
            .global("gameState", json!({ "scene": "town", "gold": 0 }))
            .tick(Duration::from_millis(16))
            .on_click([Effect::set("gameState.scene", "menu")])
            .on_script("window.gameState.gold = 50", [Effect::set("gameState.gold", 50)]);
        let controller = SessionController::new(Arc::new(MockBrowser::new(app)));
        let mut session = ready_session(&controller).await;

        let actions = vec![
            Action::Click {
                x: 640.0,
                y: 360.0,
                settle: Duration::from_millis(50),
            },
            Action::Eval {
                script: "window.gameState.gold = 50".to_string(),
                settle: Duration::ZERO,
            },
        ];
        assert_eq!(actions[0].to_string(), "click (640, 360)");
        sequencer().run(&mut session, &actions).await.unwrap();

        let checkpoint = Checkpoint::new("menu open")
            .expect(Expectation::field("scene").equals("menu"))
            .expect(Expectation::field("gold").equals(50));
        let result = verifier::checkpoint(&mut session, &checkpoint).await.unwrap();
        assert!(result.passed, "{result:?}");
        controller.close(session).await.unwrap();
    }

    #[test]
    fn test_display() {
        assert_eq!(Action::press(key("q"), Duration::ZERO).to_string(), "press q");
        assert_eq!(Action::Wait(Duration::from_millis(250)).to_string(), "wait 250ms");
        assert_eq!(
            Action::KeyDown {
                key: key(" "),
                settle: Duration::ZERO
            }
            .to_string(),
            "key_down Space"
        );
    }
}
