//! Default names for agent-provisioned peers

use rand::Rng;

/// Name for a peer the agent creates on its own
///
/// `interactive-<host>-<user>-<n>`, with the host cut at its first dot and
/// both parts reduced to lowercase alphanumerics and dashes.
pub fn interactive_peer_name() -> String {
    let host = gethostname::gethostname().to_string_lossy().into_owned();
    let user = whoami::username();
    let n: u32 = rand::thread_rng().gen_range(0..1000);
    format_name(&host, &user, n)
}

fn format_name(host: &str, user: &str, n: u32) -> String {
    let host = host.split('.').next().unwrap_or_default();
    format!("interactive-{}-{}-{}", sanitize(host), sanitize(user), n)
}

fn sanitize(part: &str) -> String {
    let cleaned: String = part
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches('-');
    if cleaned.is_empty() {
        "unknown".to_string()
    } else {
        cleaned.to_string()
    }
}
