//! Terminal UI utilities

use budgetbot_engine::Amount;
use colored::Colorize;

/// Print a success message
pub fn success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error message
pub fn error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print an info message
pub fn info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Print a warning message
pub fn warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print a section header
pub fn header(text: &str) {
    println!("\n{}", text.bold().underline());
}

/// Print a key-value pair
pub fn key_value(key: &str, value: &str) {
    println!("  {}: {}", key.cyan(), value);
}

/// Format an amount with its currency, red when negative
pub fn money(amount: &Amount, currency: &str) -> String {
    let text = format!("{} {}", amount.to_fixed(), currency);
    if amount.is_positive() || amount.is_zero() {
        text.green().to_string()
    } else {
        text.red().to_string()
    }
}

/// Print a separator line
pub fn separator() {
    println!("{}", "─".repeat(60).dimmed());
}

/// Print JSON prettily
pub fn json(value: &serde_json::Value) {
    if let Ok(pretty) = serde_json::to_string_pretty(value) {
        println!("{}", pretty);
    }
}
