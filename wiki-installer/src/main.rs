use std::path::PathBuf;

fn arg_value(args: &[String], name: &str) -> Option<String> {
    let prefix = format!("{}=", name);
    args.iter()
        .find_map(|a| a.strip_prefix(&prefix).map(str::to_string))
        .filter(|v| !v.trim().is_empty())
}

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();
    let root = arg_value(&args, "--root").map(PathBuf::from);

    // Reports whether the wizard is reachable for the install root and exits 0.
    if args.iter().any(|a| a == "--status") {
        std::process::exit(wiki_installer::run_status(root.as_deref()));
    }

    // Non-interactive install from a TOML answers file.
    // Exit codes: 0 installed, 1 invalid answers / retryable failure, 2 fatal.
    if let Some(answers) = arg_value(&args, "--answers") {
        let code = wiki_installer::run_answers(root.as_deref(), &PathBuf::from(answers)).await;
        std::process::exit(code);
    }

    eprintln!("Usage: wiki-installer [--root=<dir>] (--status | --answers=<file.toml>)");
    std::process::exit(wiki_installer::EXIT_RETRYABLE);
}
