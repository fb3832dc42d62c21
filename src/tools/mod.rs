//! Speech and actuation collaborators
//!
//! The dispatcher only sees the [`Speaker`], [`Navigator`] and
//! [`Manipulator`] traits. Speech never fails from the caller's point of
//! view; actuators report success as a `bool`.

use crate::config::SoulConfig;
use crate::error::SoulError;
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{error, info, warn};

//
// ================= Speech =================
//

/// Speech output. Never fails: providers absorb their own errors.
#[async_trait]
pub trait Speaker: Send + Sync {
    async fn speak(&self, text: &str);
}

/// One text-to-speech backend
#[async_trait]
pub trait SpeechProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn say(&self, text: &str) -> Result<()>;
}

/// Tries each provider in order until one succeeds.
pub struct FallbackSpeaker {
    providers: Vec<Arc<dyn SpeechProvider>>,
}

impl FallbackSpeaker {
    pub fn new(providers: Vec<Arc<dyn SpeechProvider>>) -> Self {
        Self { providers }
    }
}

#[async_trait]
impl Speaker for FallbackSpeaker {
    async fn speak(&self, text: &str) {
        if text.is_empty() {
            return;
        }

        for provider in &self.providers {
            match provider.say(text).await {
                Ok(()) => return,
                Err(e) => {
                    warn!(provider = provider.name(), error = %e, "Speech provider failed, trying next");
                }
            }
        }

        let preview: String = text.chars().take(80).collect();
        warn!("No speech provider available, text not spoken: {}", preview);
    }
}

/// Writes "<robot>: <text>" to stdout. Used in text mode and as the last
/// provider in a fallback chain.
pub struct ConsoleVoice {
    robot_name: String,
}

impl ConsoleVoice {
    pub fn new(robot_name: impl Into<String>) -> Self {
        Self {
            robot_name: robot_name.into(),
        }
    }
}

#[async_trait]
impl SpeechProvider for ConsoleVoice {
    fn name(&self) -> &str {
        "console"
    }

    async fn say(&self, text: &str) -> Result<()> {
        let mut stdout = tokio::io::stdout();
        stdout
            .write_all(format!("{}: {}\n", self.robot_name, text).as_bytes())
            .await?;
        stdout.flush().await?;
        Ok(())
    }
}

//
// ================= Actuation =================
//

#[async_trait]
pub trait Navigator: Send + Sync {
    /// `Ok(true)` once the robot reached `destination`
    async fn navigate(&self, destination: &str) -> Result<bool>;
}

#[async_trait]
pub trait Manipulator: Send + Sync {
    /// `action` is one of pick_up, put_down, hand_over
    async fn manipulate(&self, action: &str, target: &str) -> Result<bool>;
}

#[derive(Clone)]
struct PolicyClient {
    client: Client,
    endpoint: String,
}

impl PolicyClient {
    fn connect(host: &str, port: u16, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(2)
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: format!("http://{}:{}/get_action", host, port),
        })
    }

    async fn get_action(&self, observation: Value) -> Result<Value> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "observation": observation }))
            .send()
            .await
            .map_err(|e| SoulError::Actuation(format!("policy server unreachable: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SoulError::Actuation(format!(
                "policy server returned {}",
                status
            )));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| SoulError::Actuation(format!("invalid policy response: {}", e)))
    }
}

/// Navigation and manipulation through the robot's policy server.
///
/// With the policy server disabled every command is simulated: logged with a
/// `[SIM]` prefix and reported as successful.
pub struct PolicyActuator {
    client: Option<PolicyClient>,
}

impl PolicyActuator {
    pub fn simulated() -> Self {
        Self { client: None }
    }

    pub fn from_config(config: &SoulConfig) -> Result<Self> {
        if !config.policy_enabled {
            info!("Policy server disabled, actuation runs in simulation mode");
            return Ok(Self::simulated());
        }

        let client = PolicyClient::connect(
            &config.policy_host,
            config.policy_port,
            config.request_timeout_secs,
        )?;
        info!(endpoint = %client.endpoint, "Policy server configured");
        Ok(Self {
            client: Some(client),
        })
    }

    pub fn is_simulated(&self) -> bool {
        self.client.is_none()
    }

    async fn send(&self, description: &str, observation: Value) -> Result<bool> {
        let Some(client) = &self.client else {
            info!("[SIM] {} (simulation mode)", description);
            return Ok(true);
        };

        match client.get_action(observation).await {
            Ok(result) => {
                info!("{}: {}", description, result);
                Ok(true)
            }
            Err(e) => {
                error!("{} failed: {}", description, e);
                Ok(false)
            }
        }
    }
}

#[async_trait]
impl Navigator for PolicyActuator {
    async fn navigate(&self, destination: &str) -> Result<bool> {
        self.send(
            &format!("Navigate to {}", destination),
            json!({ "command": "navigate", "destination": destination }),
        )
        .await
    }
}

#[async_trait]
impl Manipulator for PolicyActuator {
    async fn manipulate(&self, action: &str, target: &str) -> Result<bool> {
        self.send(
            &format!("Manipulate {} {}", action, target),
            json!({ "command": "manipulate", "action": action, "target": target }),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlakyVoice {
        fail: bool,
        calls: AtomicUsize,
    }

    impl FlakyVoice {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                fail,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl SpeechProvider for FlakyVoice {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn say(&self, _text: &str) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(SoulError::Actuation("speaker unplugged".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test]
    async fn test_fallback_speaker_uses_next_provider() {
        let primary = FlakyVoice::new(true);
        let backup = FlakyVoice::new(false);
        let speaker = FallbackSpeaker::new(vec![primary.clone(), backup.clone()]);

        speaker.speak("Hello").await;
        assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
        assert_eq!(backup.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fallback_speaker_absorbs_total_failure() {
        let only = FlakyVoice::new(true);
        let speaker = FallbackSpeaker::new(vec![only.clone()]);
        speaker.speak("Hello").await;
        assert_eq!(only.calls.load(Ordering::SeqCst), 1);

        speaker.speak("").await;
        assert_eq!(only.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_simulated_actuator_always_succeeds() {
        let actuator = PolicyActuator::simulated();
        assert!(actuator.is_simulated());
        assert!(actuator.navigate("dining room").await.unwrap());
        assert!(actuator.manipulate("pick_up", "glasses").await.unwrap());
    }

    #[test]
    fn test_disabled_policy_config_is_simulated() {
        let actuator = PolicyActuator::from_config(&SoulConfig::default()).unwrap();
        assert!(actuator.is_simulated());
    }

    #[tokio::test]
    async fn test_unreachable_policy_server_reports_failure() {
        let config = SoulConfig {
            policy_enabled: true,
            policy_host: "127.0.0.1".to_string(),
            policy_port: 9,
            request_timeout_secs: 2,
            ..Default::default()
        };
        let actuator = PolicyActuator::from_config(&config).unwrap();
        assert!(!actuator.is_simulated());
        assert!(!actuator.navigate("garden").await.unwrap());
    }
}
