use anyhow::Result;
use async_trait::async_trait;
use rand::{rngs::StdRng, Rng, SeedableRng};
use sha2::{Digest, Sha256};

use super::IdentityResolver;

/// Who we are on the feed: used as the author of local echoes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub public_key: String,
    pub alias: String,
    pub avatar_svg: String,
}

impl Identity {
    pub async fn resolve(resolver: &dyn IdentityResolver, public_key: &str) -> Self {
        let alias = resolver
            .resolve_alias(public_key)
            .await
            .unwrap_or_else(|_| short_key(public_key));
        let avatar_svg = resolver.resolve_avatar(public_key).await.unwrap_or_default();

        Self {
            public_key: public_key.to_string(),
            alias,
            avatar_svg,
        }
    }
}

/// First eight characters of a key, used when no alias can be resolved.
pub fn short_key(public_key: &str) -> String {
    let end = public_key
        .char_indices()
        .nth(8)
        .map(|(i, _)| i)
        .unwrap_or(public_key.len());
    format!("anon{}", &public_key[..end])
}

/// Derives aliases and identicons from the key alone, so every client shows
/// the same name and picture for the same author.
#[derive(Debug, Clone, Default)]
pub struct LocalIdentityResolver;

impl LocalIdentityResolver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl IdentityResolver for LocalIdentityResolver {
    async fn resolve_alias(&self, public_key: &str) -> Result<String> {
        Ok(generate_alias(public_key))
    }

    async fn resolve_avatar(&self, public_key: &str) -> Result<String> {
        Ok(generate_identicon(public_key))
    }
}

fn key_digest(public_key: &str) -> [u8; 32] {
    Sha256::digest(public_key.as_bytes()).into()
}

/// Format: {adjective}{noun}{number}
fn generate_alias(public_key: &str) -> String {
    let adjectives = [
        "shadow", "cyber", "quantum", "neon", "digital", "ghost", "phantom", "void",
        "dark", "bright", "swift", "silent", "electric", "cosmic", "neural", "viral",
        "stealth", "rapid", "mystic", "plasma", "atomic", "crystal", "sonic", "lunar",
        "solar", "techno", "binary", "matrix", "nexus", "vertex", "zenith", "omega"
    ];

    let nouns = [
        "agent", "runner", "hacker", "coder", "node", "byte", "bit", "cipher",
        "protocol", "stream", "signal", "pulse", "wave", "core", "link", "port",
        "terminal", "console", "daemon", "thread", "process", "kernel", "shell", "root",
        "user", "admin", "ghost", "spirit", "entity", "being", "form", "shadow"
    ];

    let mut rng = StdRng::from_seed(key_digest(public_key));
    let adjective = adjectives[rng.gen_range(0..adjectives.len())];
    let noun = nouns[rng.gen_range(0..nouns.len())];
    let number: u16 = rng.gen_range(100..9999);

    format!("{}{}{}", adjective, noun, number)
}

/// 5x5 horizontally mirrored identicon, coloured from the key digest.
fn generate_identicon(public_key: &str) -> String {
    const CELL: usize = 10;
    let digest = key_digest(public_key);
    let colour = format!("#{:02x}{:02x}{:02x}", digest[0], digest[1], digest[2]);

    let mut rects = String::new();
    for row in 0..5 {
        for col in 0..3 {
            let bit = digest[3 + row * 3 + col] & 1 == 1;
            if !bit {
                continue;
            }
            for x in [col, 4 - col] {
                rects.push_str(&format!(
                    r#"<rect x="{}" y="{}" width="{}" height="{}"/>"#,
                    x * CELL,
                    row * CELL,
                    CELL,
                    CELL
                ));
                if x == 2 {
                    break;
                }
            }
        }
    }

    format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 50 50"><g fill="{}">{}</g></svg>"#,
        colour, rects
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn alias_is_stable_per_key() {
        let resolver = LocalIdentityResolver::new();
        let a = resolver.resolve_alias("02abcdef").await.unwrap();
        let b = resolver.resolve_alias("02abcdef").await.unwrap();
        assert_eq!(a, b);
        assert!(a.chars().last().unwrap().is_ascii_digit());
    }

    #[tokio::test]
    async fn avatar_is_svg() {
        let svg = LocalIdentityResolver::new().resolve_avatar("02abcdef").await.unwrap();
        assert!(svg.starts_with("<svg"));
        assert!(svg.ends_with("</svg>"));
        assert_eq!(svg, generate_identicon("02abcdef"));
    }

    #[test]
    fn short_key_handles_short_input() {
        assert_eq!(short_key("abc"), "anonabc");
        assert_eq!(short_key("0123456789abcdef"), "anon01234567");
    }
}
