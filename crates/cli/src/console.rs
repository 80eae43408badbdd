//! Terminal front end: renders engine events and answers operator prompts.
//!
//! Prompts reach the console over their own channel. The console drains
//! pending events before answering a prompt, so the turn being reviewed is
//! always on screen before the question about it.

use async_trait::async_trait;
use colored::{Color, Colorize};
use dk_core::scheduler::{Operator, Review};
use dk_protocol::conversation_models::{Turn, TurnOrigin};
use dk_protocol::ipc::Event;
use std::collections::HashMap;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::{mpsc, oneshot};

pub enum Prompt {
    Speaker {
        candidates: Vec<String>,
        reply: oneshot::Sender<Option<String>>,
    },
    Review {
        turn: Turn,
        reply: oneshot::Sender<Review>,
    },
}

/// [`Operator`] that forwards every question to the console task.
pub struct ConsoleOperator {
    prompts: mpsc::Sender<Prompt>,
}

impl ConsoleOperator {
    pub fn new(prompts: mpsc::Sender<Prompt>) -> Self {
        Self { prompts }
    }
}

#[async_trait]
impl Operator for ConsoleOperator {
    async fn choose_speaker(&self, candidates: &[String]) -> Option<String> {
        let (reply, answer) = oneshot::channel();
        self.prompts
            .send(Prompt::Speaker {
                candidates: candidates.to_vec(),
                reply,
            })
            .await
            .ok()?;
        answer.await.ok().flatten()
    }

    async fn review_turn(&self, turn: &Turn) -> Review {
        let (reply, answer) = oneshot::channel();
        let sent = self
            .prompts
            .send(Prompt::Review {
                turn: turn.clone(),
                reply,
            })
            .await;
        if sent.is_err() {
            return Review::Continue;
        }
        answer.await.unwrap_or(Review::Continue)
    }
}

pub struct Console {
    colors: HashMap<String, Color>,
    input: Lines<BufReader<Stdin>>,
}

impl Console {
    /// `colors` maps agent ids (lowercase) to color names from their definitions.
    pub fn new(colors: HashMap<String, String>) -> Self {
        Self {
            colors: colors
                .into_iter()
                .filter(|(_, name)| !name.is_empty())
                .map(|(id, name)| (id, Color::from(name.as_str())))
                .collect(),
            input: BufReader::new(tokio::io::stdin()).lines(),
        }
    }

    /// Run until the engine drops its event sender.
    pub async fn run(mut self, mut events: mpsc::Receiver<Event>, mut prompts: mpsc::Receiver<Prompt>) {
        loop {
            tokio::select! {
                biased;
                event = events.recv() => match event {
                    Some(event) => self.render(&event),
                    None => break,
                },
                Some(prompt) = prompts.recv() => self.answer(prompt).await,
            }
        }
    }

    async fn read_line(&mut self, question: &str) -> Option<String> {
        print!("{} ", question.bold());
        let _ = std::io::stdout().flush();
        self.input.next_line().await.ok().flatten()
    }

    async fn answer(&mut self, prompt: Prompt) {
        match prompt {
            Prompt::Speaker { candidates, reply } => {
                println!("{}", "Who speaks next?".bold());
                for (i, id) in candidates.iter().enumerate() {
                    println!("  {}. {}", i + 1, self.speaker(id));
                }
                let answer = self.read_line("Number or name (empty line or EOF ends):").await;
                let answer = answer.filter(|a| !a.trim().is_empty());
                let _ = reply.send(answer);
            }
            Prompt::Review { turn, reply } => {
                let question = format!(
                    "[{} done] Enter to continue, text to give feedback, 'quit' to stop:",
                    turn.speaker
                );
                let review = match self.read_line(&question).await {
                    None => Review::Stop,
                    Some(line) => parse_review(&line),
                };
                let _ = reply.send(review);
            }
        }
    }

    fn speaker(&self, id: &str) -> colored::ColoredString {
        match self.colors.get(&id.to_ascii_lowercase()) {
            Some(color) => id.color(*color).bold(),
            None => id.bold(),
        }
    }

    fn render(&self, event: &Event) {
        match event {
            Event::ConversationStarted {
                conversation_id,
                topic,
                parent_id,
                transcript,
                resumed,
            } => {
                let verb = if *resumed { "Resumed" } else { "Started" };
                println!("{} conversation {}", verb.green().bold(), conversation_id);
                if let Some(parent) = parent_id {
                    println!("  continues {parent}");
                }
                println!("  topic: {topic}");
                println!("  transcript: {}", transcript.display());
            }
            Event::TurnAppended { turn, .. } => self.render_turn(turn),
            Event::TurnDegraded {
                speaker,
                attempts,
                error,
                ..
            } => {
                eprintln!(
                    "{} {} failed after {} attempt(s): {}",
                    "warning:".yellow().bold(),
                    speaker,
                    attempts,
                    error
                );
            }
            Event::FeedbackInjected { turn, .. } => {
                println!("{} {}\n", "User Feedback:".magenta().bold(), turn.content);
            }
            Event::ConversationReset {
                old_conversation_id,
                new_conversation_id,
                transcript,
                summary_chars,
            } => {
                println!(
                    "{} {} -> {} ({} chars of summary)",
                    "Compressed".cyan().bold(),
                    old_conversation_id,
                    new_conversation_id,
                    summary_chars
                );
                println!("  transcript: {}", transcript.display());
            }
            Event::CompressionSkipped { reason, .. } => {
                eprintln!("{} compression skipped: {}", "warning:".yellow().bold(), reason);
            }
            Event::ConversationTerminated {
                conversation_id,
                rounds,
                reason,
            } => {
                println!(
                    "{} conversation {} after {} round(s): {}",
                    "Finished".green().bold(),
                    conversation_id,
                    rounds,
                    reason
                );
            }
        }
    }

    fn render_turn(&self, turn: &Turn) {
        let label = match turn.origin {
            TurnOrigin::Agent => self.speaker(&turn.speaker),
            TurnOrigin::User => "User Feedback".magenta().bold(),
            TurnOrigin::Compression => format!("{} (Compressed Summary)", turn.speaker).cyan().bold(),
        };
        println!("{} {}", format!("Round {} -", turn.round).dimmed(), label);
        println!("{}\n", turn.content);
    }
}

/// Operator input after a turn.
pub fn parse_review(line: &str) -> Review {
    let line = line.trim();
    if line.is_empty() {
        Review::Continue
    } else if ["quit", "exit", "/stop"].iter().any(|w| line.eq_ignore_ascii_case(w)) {
        Review::Stop
    } else {
        Review::Feedback(line.to_string())
    }
}
