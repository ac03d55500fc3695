//! Human confirmation gate

use async_trait::async_trait;
use colored::Colorize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::debug;

#[async_trait]
pub trait Confirmer: Send + Sync {
    /// Ask a yes/no question; anything but an explicit yes is a no
    async fn confirm(&self, prompt: &str) -> bool;
}

/// Prompts on the terminal and reads the answer from stdin
#[derive(Debug, Default, Clone)]
pub struct StdinConfirmer;

#[async_trait]
impl Confirmer for StdinConfirmer {
    async fn confirm(&self, prompt: &str) -> bool {
        let mut stdout = tokio::io::stdout();
        let question = format!("{} {} ", prompt.bold(), "[y/N]".dimmed());
        if stdout.write_all(question.as_bytes()).await.is_err() || stdout.flush().await.is_err() {
            return false;
        }

        let mut line = String::new();
        let mut reader = BufReader::new(tokio::io::stdin());
        match reader.read_line(&mut line).await {
            Ok(_) => is_yes(&line),
            Err(e) => {
                debug!(error = %e, "failed to read confirmation");
                false
            }
        }
    }
}

/// Always gives the same answer (`--yes`, tests)
#[derive(Debug, Clone, Copy)]
pub struct FixedAnswer(pub bool);

#[async_trait]
impl Confirmer for FixedAnswer {
    async fn confirm(&self, prompt: &str) -> bool {
        debug!(prompt, answer = self.0, "confirmation answered without prompting");
        self.0
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}
