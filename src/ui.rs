use colored::Colorize;
use converge::{NodeOutcome, ResourceKey};

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a dim/muted message
pub fn dim(msg: &str) {
    println!("  {}", msg.dimmed());
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a section header
pub fn section(title: &str) {
    println!();
    println!("{}", title.cyan().bold());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

/// Short type name for display: `azure-native:network:Subnet` -> `Subnet`
pub fn short_kind(kind: &str) -> &str {
    kind.rsplit(':').next().unwrap_or(kind)
}

/// `Subnet snet`
pub fn resource(key: &ResourceKey) -> String {
    format!("{} {}", short_kind(&key.kind).dimmed(), key.name.bold())
}

/// Colored verb for an outcome
pub fn outcome(outcome: NodeOutcome) -> String {
    match outcome {
        NodeOutcome::Created => "created".green().to_string(),
        NodeOutcome::Updated => "updated".yellow().to_string(),
        NodeOutcome::Unchanged => "unchanged".dimmed().to_string(),
        NodeOutcome::Deleted => "deleted".red().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_kind() {
        assert_eq!(short_kind("azure-native:network:Subnet"), "Subnet");
        assert_eq!(short_kind("plain"), "plain");
    }

    #[test]
    fn test_resource_label_contains_name() {
        colored::control::set_override(false);
        let key = ResourceKey::new("azure-native:compute:VirtualMachine", "ubuntu");
        assert_eq!(resource(&key), "VirtualMachine ubuntu");
        assert_eq!(outcome(NodeOutcome::Unchanged), "unchanged");
    }
}
