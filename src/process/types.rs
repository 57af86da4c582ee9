//! Process type definitions.
//!
//! A process is described as an argument vector; the first element is the
//! program to run.

/// An argument vector, program first
pub type Argv = Vec<String>;

/// Render an argument vector as a single shell-like line for logging
pub fn render(argv: &[String]) -> String {
    argv.iter()
        .map(|arg| {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                format!("'{}'", arg)
            } else {
                arg.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_quotes_whitespace() {
        let argv = vec!["echo".to_string(), "hello world".to_string(), String::new()];
        assert_eq!(render(&argv), "echo 'hello world' ''");
    }
}
