//! Deterministic names derived from approach labels and remotes.

/// Namespace every agent branch lives under.
pub const BRANCH_PREFIX: &str = "agent/";

const FALLBACK_SLUG: &str = "approach";

/// Branch for an approach: `agent/` plus a lowercase, hyphenated slug.
///
/// `"Sliding Window!"` becomes `agent/sliding-window`.
pub fn branch_for_approach(approach: &str) -> String {
    format!("{BRANCH_PREFIX}{}", slugify(approach))
}

/// Directory name for an approach workspace: spaces and path separators become `_`.
pub fn workspace_dir_name(approach: &str) -> String {
    let trimmed = approach.trim();
    if trimmed.is_empty() {
        return FALLBACK_SLUG.to_string();
    }
    trimmed
        .chars()
        .map(|c| match c {
            ' ' | '/' | '\\' => '_',
            other => other,
        })
        .collect()
}

/// Lowercase alphanumeric runs joined by single hyphens.
pub fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    for c in value.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        FALLBACK_SLUG.to_string()
    } else {
        slug.to_string()
    }
}

/// True when the value names a remote rather than a local path.
pub fn looks_like_remote(value: &str) -> bool {
    ["http://", "https://", "git@", "ssh://", "git://"]
        .iter()
        .any(|prefix| value.starts_with(prefix))
        || value.ends_with(".git")
}

/// Checkout directory name for a remote: its last three path tokens joined by `-`.
///
/// `https://github.com/example/awesome-repo.git` becomes
/// `github.com-example-awesome-repo`.
pub fn remote_slug(remote: &str) -> String {
    let without_scheme = remote
        .split_once("://")
        .map_or(remote, |(_, rest)| rest);
    let without_user = without_scheme
        .split_once('@')
        .map_or(without_scheme, |(_, rest)| rest);
    let trimmed = without_user.trim_end_matches('/');
    let trimmed = trimmed.strip_suffix(".git").unwrap_or(trimmed);
    let tokens: Vec<&str> = trimmed
        .split(['/', ':'])
        .filter(|token| !token.is_empty())
        .collect();
    let tail = &tokens[tokens.len().saturating_sub(3)..];
    let slug: String = tail
        .join("-")
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        "repository".to_string()
    } else {
        slug.to_string()
    }
}

/// File name for a saved pull request body.
pub fn pull_request_file_name(branch: &str) -> String {
    format!("{}.md", branch.replace('/', "-"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn branch_is_lowercase_hyphenated() {
        assert_eq!(branch_for_approach("Sliding Window!"), "agent/sliding-window");
        assert_eq!(branch_for_approach("token bucket"), "agent/token-bucket");
        assert_eq!(branch_for_approach("  A++ / B  "), "agent/a-b");
    }

    #[test]
    fn blank_approach_gets_fallback_branch() {
        assert_eq!(branch_for_approach("!!!"), "agent/approach");
        assert_eq!(branch_for_approach(""), "agent/approach");
    }

    #[test]
    fn workspace_name_replaces_spaces_and_separators() {
        assert_eq!(workspace_dir_name("token bucket"), "token_bucket");
        assert_eq!(workspace_dir_name("a/b"), "a_b");
        assert_eq!(workspace_dir_name("   "), "approach");
    }

    #[test]
    fn remote_slug_matches_host_and_path() {
        assert_eq!(
            remote_slug("https://github.com/example/awesome-repo.git"),
            "github.com-example-awesome-repo"
        );
        assert_eq!(
            remote_slug("git@github.com:example/tool.git"),
            "github.com-example-tool"
        );
        assert_eq!(
            remote_slug("https://git.example.org/Group/Sub/Project.git"),
            "group-sub-project"
        );
    }

    #[test]
    fn remote_detection() {
        assert!(looks_like_remote("https://github.com/example/repo.git"));
        assert!(looks_like_remote("git@github.com:example/repo.git"));
        assert!(looks_like_remote("/srv/mirrors/project.git"));
        assert!(!looks_like_remote("./local/repo"));
    }

    #[test]
    fn pull_request_file_flattens_branch() {
        assert_eq!(
            pull_request_file_name("agent/token-bucket"),
            "agent-token-bucket.md"
        );
    }
}
