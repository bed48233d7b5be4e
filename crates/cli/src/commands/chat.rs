//! `charmline chat`: Single-message or interactive chat with a persona.

use charmline_core::{Backend, ConversationId, ConversationStore, PersonaCatalog, PersonaId};
use charmline_engine::{ChatOutcome, ChatRequest};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

pub struct ChatOptions {
    pub persona: String,
    pub message: Option<String>,
    pub backend: Option<Backend>,
    pub conversation: Option<String>,
}

pub async fn run(options: ChatOptions, ephemeral: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(ephemeral)?;

    let backend = options.backend.unwrap_or(config.default_backend);
    if !config.has_api_key(backend) {
        eprintln!();
        eprintln!("  ERROR: No API key configured for {backend}!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    OPENAI_API_KEY    = 'sk-...'");
        eprintln!("    ANTHROPIC_API_KEY = 'sk-ant-...'");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", charmline_config::AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let services = charmline_gateway::build_services(&config).await?;
    let persona = services
        .storage
        .get(&PersonaId(options.persona.clone()))
        .await
        .map_err(|e| format!("Unknown persona '{}': {e}", options.persona))?;

    let mut conversation = options.conversation.map(ConversationId);
    if let Some(ref id) = conversation {
        debug!(conversation = %id, "Resuming conversation");
    }

    if let Some(message) = options.message {
        let outcome = services
            .engine
            .handle(request(&persona.id, &conversation, message, options.backend))
            .await?;
        print!("{}", render_outcome(&persona.name, &outcome));
        println!("  (conversation {})", outcome.conversation_id);
        return Ok(());
    }

    println!();
    println!("  Chatting with {} (reward at {})", persona.name, persona.threshold);
    println!("  Backend:  {backend}");
    println!("  Store:    {}", services.storage.name());
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'exit' or Ctrl+C to quit.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    print!("  You > ");
    std::io::stdout().flush()?;

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line == "exit" || line == "quit" {
            break;
        }
        if !line.is_empty() {
            let turn = request(&persona.id, &conversation, line.to_string(), options.backend);
            match services.engine.handle(turn).await {
                Ok(outcome) => {
                    println!();
                    print!("{}", render_outcome(&persona.name, &outcome));
                    println!();
                    conversation = Some(outcome.conversation_id);
                }
                Err(e) => {
                    eprintln!("  [{}] {e}", e.kind());
                    println!();
                }
            }
        }

        print!("  You > ");
        std::io::stdout().flush()?;
    }

    if let Some(id) = conversation {
        println!("\n  Conversation saved as {id}");
    }

    Ok(())
}

fn request(
    persona: &PersonaId,
    conversation: &Option<ConversationId>,
    message: String,
    backend: Option<Backend>,
) -> ChatRequest {
    ChatRequest {
        persona_id: persona.clone(),
        conversation_id: conversation.clone(),
        message,
        backend,
    }
}

/// Terminal rendering of one turn's outcome.
fn render_outcome(name: &str, outcome: &ChatOutcome) -> String {
    let mut out = String::new();
    for line in outcome.message.lines() {
        out.push_str(&format!("  {name} > {line}\n"));
    }
    if outcome.impression_score > 0 {
        out.push_str(&format!(
            "  [impression {} · average {}]\n",
            outcome.impression_score, outcome.avg_score
        ));
    }
    if let Some(ref image) = outcome.reward_image {
        out.push_str(&format!("  [reward] {image}\n"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(message: &str, score: u32, avg: u32, image: Option<&str>) -> ChatOutcome {
        ChatOutcome {
            conversation_id: ConversationId::from("c1"),
            message: message.into(),
            impression_score: score,
            avg_score: avg,
            reward_image: image.map(String::from),
            backend: Backend::OpenAi,
            gate_met: image.is_some(),
        }
    }

    #[test]
    fn opening_turn_shows_reply_only() {
        let text = render_outcome("Ava", &outcome("Hi there.", 0, 0, None));
        assert_eq!(text, "  Ava > Hi there.\n");
    }

    #[test]
    fn scored_turn_shows_scores() {
        let text = render_outcome("Ava", &outcome("Ha.", 60, 70, None));
        assert!(text.contains("impression 60"));
        assert!(text.contains("average 70"));
        assert!(!text.contains("[reward]"));
    }

    #[test]
    fn reward_image_is_printed() {
        let text = render_outcome(
            "Ava",
            &outcome("Ha.\nHere's a treat.", 90, 77, Some("https://img/1.png")),
        );
        assert!(text.contains("  Ava > Here's a treat.\n"));
        assert!(text.contains("[reward] https://img/1.png"));
    }
}
