//! User prompt utilities for interactive confirmation

use anyhow::Result;
use dialoguer::Confirm;
use std::io::IsTerminal;

/// Ask user for yes/no confirmation
pub fn confirm(prompt: &str) -> Result<bool> {
    let result = Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()?;

    Ok(result)
}

/// Whether a human can answer prompts
pub fn is_interactive() -> bool {
    std::io::stdin().is_terminal() && std::io::stderr().is_terminal()
}

/// Decide whether a destructive step needs an explicit yes
pub fn needs_confirmation(confirm_destructive: bool, assume_yes: bool, interactive: bool) -> bool {
    confirm_destructive && !assume_yes && interactive
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_needs_confirmation() {
        assert!(needs_confirmation(true, false, true));
        assert!(!needs_confirmation(true, true, true));
        assert!(!needs_confirmation(true, false, false));
        assert!(!needs_confirmation(false, false, true));
    }
}
