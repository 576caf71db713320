//! Saída de terminal do jobwatch para o modo `--dry-run`.
//!
//! Usa a crate `console` para estilização com cores. O [`ConsoleReport`]
//! substitui todas as reações reais: mostra o que seria notificado e
//! não grava nada no estado.

use async_trait::async_trait;
use console::Style;

use crate::reaction::{ReactionError, ReactionSink};
use crate::watch::{JobState, StateChange};

/// Relatório colorido das mudanças detectadas em um ciclo.
///
/// Vagas novas aparecem em verde, reabertas em amarelo e encerradas em vermelho.
pub struct ConsoleReport {
    // Estilo verde para vagas novas.
    green: Style,
    // Estilo amarelo para vagas reabertas.
    yellow: Style,
    // Estilo vermelho para vagas encerradas.
    red: Style,
    // Estilo esmaecido para URL e origem.
    dim: Style,
}

impl Default for ConsoleReport {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleReport {
    pub fn new() -> Self {
        Self {
            green: Style::new().green().bold(),
            yellow: Style::new().yellow(),
            red: Style::new().red().bold(),
            dim: Style::new().dim(),
        }
    }

    /// Monta o texto do relatório sem imprimir.
    pub fn render(&self, changes: &[StateChange]) -> String {
        if changes.is_empty() {
            return "[DRY RUN] No new matches found.\n".to_string();
        }

        let mut out = String::from("[DRY RUN] New matches that would be notified:\n\n");
        for change in changes {
            let p = &change.posting;
            let marker = match (change.old, change.new) {
                (Some(JobState::Closed), JobState::Open) => self.yellow.apply_to("↻"),
                (_, JobState::Open) => self.green.apply_to("+"),
                (_, JobState::Closed) => self.red.apply_to("✗"),
            };
            out.push_str(&format!(
                "{marker} {} - {}\n  {}\n  {}\n\n",
                p.title,
                p.location.trim(),
                self.dim.apply_to(&p.url),
                self.dim.apply_to(format!("Source: {}", p.source)),
            ));
        }
        out
    }
}

#[async_trait]
impl ReactionSink for ConsoleReport {
    fn name(&self) -> &str {
        "console"
    }

    async fn deliver(&self, changes: &[StateChange]) -> Result<(), ReactionError> {
        print!("{}", self.render(changes));
        Ok(())
    }
}
