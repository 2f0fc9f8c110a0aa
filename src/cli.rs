//! Minimal CLI parsing for the discover/add/analyze/ping operations.

use std::env;

use anyhow::{Result, bail};

use curator::sync::SyncOptions;

#[derive(Debug)]
pub enum Command {
    /// Run discovery and optionally sync the results into the library.
    Discover {
        prompt: String,
        limit: usize,
        region: Option<String>,
        sync: bool,
        options: SyncOptions,
    },
    /// Add one explicitly-specified title.
    Add {
        title: String,
        year: Option<i32>,
        tmdb_id: Option<i64>,
        imdb_id: Option<String>,
        options: SyncOptions,
    },
    /// Analyze one title's quality without touching the library.
    Analyze { title: String, year: Option<i32> },
    /// Probe library connectivity.
    Ping,
    Help,
}

pub const USAGE: &str = "\
curator - movie discovery with a quality-gated library sync

USAGE:
    curator discover [OPTIONS] <PROMPT>
    curator add [OPTIONS] <TITLE>
    curator analyze [--year <Y>] <TITLE>
    curator ping

OPTIONS (discover):
    --limit <N>        Number of results, 1-50 (default 10)
    --region <R>       Region hint (default from config)
    --sync             Sync discovered candidates into the library

OPTIONS (discover --sync, add):
    --year <Y>         Release year (add only)
    --tmdb <ID>        Content-database id (add only)
    --imdb <ID>        Review-database id (add only)
    --force            Override the quality gate
    --skip-quality     Skip quality analysis entirely
    --dry-run          Resolve without issuing additions
";

impl Command {
    pub fn from_args() -> Result<Command> {
        Self::parse(env::args().skip(1).collect())
    }

    fn parse(args: Vec<String>) -> Result<Command> {
        let Some(verb) = args.first() else {
            return Ok(Command::Help);
        };

        match verb.as_str() {
            "discover" => {
                let mut prompt_words: Vec<String> = Vec::new();
                let mut limit = 10usize;
                let mut region = None;
                let mut sync = false;
                let mut options = SyncOptions::default();

                let mut rest = args[1..].iter();
                while let Some(arg) = rest.next() {
                    match arg.as_str() {
                        "--limit" => {
                            limit = next_value(&mut rest, "--limit")?.parse()?;
                        }
                        "--region" => region = Some(next_value(&mut rest, "--region")?),
                        "--sync" => sync = true,
                        "--force" => options.force = true,
                        "--skip-quality" => options.skip_quality = true,
                        "--dry-run" => options.dry_run = true,
                        other if other.starts_with("--") => bail!("unknown option: {other}"),
                        word => prompt_words.push(word.to_string()),
                    }
                }

                if prompt_words.is_empty() {
                    bail!("discover requires a prompt");
                }
                Ok(Command::Discover {
                    prompt: prompt_words.join(" "),
                    limit,
                    region,
                    sync,
                    options,
                })
            }
            "add" => {
                let mut title_words: Vec<String> = Vec::new();
                let mut year = None;
                let mut tmdb_id = None;
                let mut imdb_id = None;
                let mut options = SyncOptions::default();

                let mut rest = args[1..].iter();
                while let Some(arg) = rest.next() {
                    match arg.as_str() {
                        "--year" => year = Some(next_value(&mut rest, "--year")?.parse()?),
                        "--tmdb" => tmdb_id = Some(next_value(&mut rest, "--tmdb")?.parse()?),
                        "--imdb" => imdb_id = Some(next_value(&mut rest, "--imdb")?),
                        "--force" => options.force = true,
                        "--skip-quality" => options.skip_quality = true,
                        "--dry-run" => options.dry_run = true,
                        other if other.starts_with("--") => bail!("unknown option: {other}"),
                        word => title_words.push(word.to_string()),
                    }
                }

                if title_words.is_empty() && tmdb_id.is_none() && imdb_id.is_none() {
                    bail!("add requires a title or an identifier");
                }
                Ok(Command::Add {
                    title: title_words.join(" "),
                    year,
                    tmdb_id,
                    imdb_id,
                    options,
                })
            }
            "analyze" => {
                let mut title_words: Vec<String> = Vec::new();
                let mut year = None;

                let mut rest = args[1..].iter();
                while let Some(arg) = rest.next() {
                    match arg.as_str() {
                        "--year" => year = Some(next_value(&mut rest, "--year")?.parse()?),
                        other if other.starts_with("--") => bail!("unknown option: {other}"),
                        word => title_words.push(word.to_string()),
                    }
                }

                if title_words.is_empty() {
                    bail!("analyze requires a title");
                }
                Ok(Command::Analyze {
                    title: title_words.join(" "),
                    year,
                })
            }
            "ping" => Ok(Command::Ping),
            "help" | "--help" | "-h" => Ok(Command::Help),
            other => bail!("unknown command: {other}"),
        }
    }
}

fn next_value<'a>(
    rest: &mut std::slice::Iter<'a, String>,
    flag: &str,
) -> Result<String> {
    match rest.next() {
        Some(value) => Ok(value.clone()),
        None => bail!("{flag} requires a value"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_discover() {
        let command = Command::parse(strings(&[
            "discover", "new", "horror", "movies", "--limit", "5", "--sync", "--dry-run",
        ]))
        .unwrap();
        match command {
            Command::Discover {
                prompt,
                limit,
                sync,
                options,
                ..
            } => {
                assert_eq!(prompt, "new horror movies");
                assert_eq!(limit, 5);
                assert!(sync);
                assert!(options.dry_run);
                assert!(!options.force);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_add_with_identifier_only() {
        let command = Command::parse(strings(&["add", "--tmdb", "1078605", "--force"])).unwrap();
        match command {
            Command::Add {
                title,
                tmdb_id,
                options,
                ..
            } => {
                assert!(title.is_empty());
                assert_eq!(tmdb_id, Some(1078605));
                assert!(options.force);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_rejects_bare_add() {
        assert!(Command::parse(strings(&["add"])).is_err());
        assert!(Command::parse(strings(&["add", "--force"])).is_err());
    }

    #[test]
    fn test_unknown_option_rejected() {
        assert!(Command::parse(strings(&["discover", "x", "--frobnicate"])).is_err());
    }
}
