use crate::ui::{theme, Icons};
use owo_colors::OwoColorize;

pub fn banner(text: &str) {
    println!("{} {}", Icons::BOLT, text.style(theme().banner));
}

pub fn error(text: &str) {
    eprintln!("{} {}", Icons::CROSS, text.style(theme().error));
}

pub fn warn(text: &str) {
    eprintln!("{} {}", Icons::WARN, text.style(theme().warn));
}

pub fn info(label: &str, value: &str) {
    println!("{} {}: {}", Icons::INFO, label.style(theme().dim), value);
}

pub fn section(title: &str) {
    println!();
    println!("━{}━", title.style(theme().banner));
}

pub fn dim(text: &str) -> String {
    text.style(theme().dim).to_string()
}

pub fn file_instrumented(path: &str, points: usize) {
    println!(
        "{} {} {}",
        Icons::WRITE.style(theme().success),
        path,
        dim(&format!("({} checkpoints)", points))
    );
}

pub fn file_skipped(path: &str, reason: &str) {
    println!(
        "{} {} {}",
        Icons::SKIP.style(theme().warn),
        path,
        dim(reason)
    );
}

pub fn file_unchanged(path: &str) {
    println!("  {}", path.style(theme().dim));
}

pub fn file_failed(path: &str, reason: &str) {
    eprintln!(
        "{} {} {}",
        Icons::CROSS.style(theme().error),
        path,
        reason.style(theme().error)
    );
}

pub fn summary_row(label: &str, value: &str) {
    println!("  {} {}", label.style(theme().dim), value);
}
