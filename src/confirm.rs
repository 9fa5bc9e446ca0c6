//! Confirmación por consola antes de escribir en el store.

use std::io::{self, BufRead, Write};

/// Qué respuesta cuenta como "sí"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    /// `s` / `si` / `sí`, sin distinguir mayúsculas
    YesNo,
    /// Hay que escribir la palabra exacta
    Typed(&'static str),
}

impl Confirmation {
    fn accepts(&self, answer: &str) -> bool {
        match self {
            Confirmation::YesNo => matches!(answer.to_lowercase().as_str(), "s" | "si" | "sí"),
            Confirmation::Typed(word) => answer == *word,
        }
    }

    fn hint(&self) -> String {
        match self {
            Confirmation::YesNo => "(s/n)".to_string(),
            Confirmation::Typed(word) => format!("Escribe '{}' para confirmar", word),
        }
    }
}

pub fn confirm(question: &str, confirmation: Confirmation) -> io::Result<bool> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    confirm_with(&mut stdin.lock(), &mut stdout, question, confirmation)
}

/// Fin de entrada cuenta como "no"
pub fn confirm_with<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    question: &str,
    confirmation: Confirmation,
) -> io::Result<bool> {
    write!(output, "{} {}: ", question, confirmation.hint())?;
    output.flush()?;

    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(confirmation.accepts(line.trim()))
}
