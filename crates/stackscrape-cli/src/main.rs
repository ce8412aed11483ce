//! Stackscrape CLI: entry point.

use std::path::Path;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use stackscrape::{
    BuildOptions, MatchOptions, StackScraper, Target, DEFAULT_FUZZY_THRESHOLD,
    DEFAULT_MAX_ANCESTOR_DEPTH,
};
use stackscrape_cli::config::resolve_rules_path;
use stackscrape_cli::input::{
    alias_pairs, aliased_items, attribute_policy, base_url, pattern_items, read_document,
    wanted_items,
};
use stackscrape_cli::output::{describe_rule, render_result, GroupBy};

#[derive(Parser)]
#[command(
    name = "stackscrape",
    about = "Learn extraction rules from one example page and replay them on similar pages",
    version
)]
struct Cli {
    /// Path to the rules file.
    #[arg(short, long, global = true)]
    rules: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Learn rules from a sample page and the values wanted from it.
    Learn {
        /// HTML file, or `-` for stdin.
        page: String,

        /// A value to extract (repeatable).
        #[arg(short, long = "wanted", required_unless_present_any = ["wanted_as", "pattern"])]
        wanted: Vec<String>,

        /// A value to extract under its own alias, as ALIAS=TEXT (repeatable).
        #[arg(long)]
        wanted_as: Vec<String>,

        /// A regular expression the whole extracted text must match (repeatable).
        #[arg(long)]
        pattern: Vec<String>,

        /// Fall back to similarity matching when a value is not found verbatim.
        #[arg(long)]
        fuzzy: bool,

        /// Similarity cutoff for the fuzzy fallback.
        #[arg(long, default_value_t = DEFAULT_FUZZY_THRESHOLD)]
        threshold: f64,

        /// Alias for values given with --wanted and --pattern.
        #[arg(long)]
        alias: Option<String>,

        /// URL the page was fetched from; lets absolute links be wanted.
        #[arg(long)]
        url: Option<String>,

        /// Compare text case-insensitively.
        #[arg(long)]
        ignore_case: bool,

        /// Maximum ancestor tags recorded per rule.
        #[arg(long, default_value_t = DEFAULT_MAX_ANCESTOR_DEPTH)]
        max_depth: usize,

        /// Attribute keys to fingerprint (default: id, class).
        #[arg(long, value_delimiter = ',')]
        attrs: Option<Vec<String>>,

        /// Merge into the existing rules instead of replacing them.
        #[arg(long)]
        update: bool,
    },

    /// Extract values from a page with the stored rules; prints JSON.
    Extract {
        /// HTML file, or `-` for stdin.
        page: String,

        /// URL the page was fetched from, for rules that return absolute links.
        #[arg(long)]
        url: Option<String>,

        /// Only elements at the positions seen during training.
        #[arg(long, conflicts_with = "best")]
        exact: bool,

        /// One best-ranked rule per learned value.
        #[arg(long)]
        best: bool,

        /// Group values by rule id or alias.
        #[arg(long, value_enum, conflicts_with = "best")]
        group_by: Option<GroupBy>,

        /// Keep empty values.
        #[arg(long)]
        keep_blank: bool,

        /// Keep repeated values.
        #[arg(long)]
        keep_duplicates: bool,

        /// Order values by position in the page rather than by rule.
        #[arg(long)]
        keep_order: bool,

        /// Only return elements in the same sibling slot as the training elements.
        #[arg(long)]
        no_sibling_leaves: bool,

        /// Minimum similarity for fingerprinted attribute values (1.0 = exact).
        #[arg(long, default_value_t = 1.0)]
        attr_fuzz_ratio: f64,
    },

    /// Inspect or edit the stored rules.
    Rules {
        #[command(subcommand)]
        action: RulesAction,
    },

    /// Validate a rules file.
    Validate,

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   stackscrape completions bash > ~/.local/share/bash-completion/completions/stackscrape
    ///   stackscrape completions zsh > ~/.zfunc/_stackscrape
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum RulesAction {
    /// List rules in replay order.
    List,

    /// Remove the given rules.
    Remove {
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Keep only the given rules.
    Keep {
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Set aliases, as RULE_ID=ALIAS pairs.
    Alias {
        #[arg(required = true)]
        pairs: Vec<String>,
    },
}

fn load(path: &Path) -> anyhow::Result<StackScraper> {
    StackScraper::load(path).with_context(|| format!("failed to load rules from {}", path.display()))
}

fn save(scraper: &StackScraper, path: &Path) -> anyhow::Result<()> {
    scraper
        .save(path)
        .with_context(|| format!("failed to save rules to {}", path.display()))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let rules_path = resolve_rules_path(cli.rules.as_deref());

    match cli.command {
        Commands::Learn {
            page,
            wanted,
            wanted_as,
            pattern,
            fuzzy,
            threshold,
            alias,
            url,
            ignore_case,
            max_depth,
            attrs,
            update,
        } => {
            let doc = read_document(&page)?;
            let options = BuildOptions {
                fuzzy_threshold: threshold,
                case_sensitive: !ignore_case,
                max_ancestor_depth: max_depth,
                base_url: base_url(url.as_deref())?,
                policy: attribute_policy(attrs.as_deref()),
            };
            let mut scraper = if update && rules_path.exists() {
                load(&rules_path)?
            } else {
                StackScraper::new()
            };

            let mut items = wanted_items(&wanted, fuzzy, alias.as_deref());
            items.extend(aliased_items(&wanted_as, fuzzy)?);
            items.extend(pattern_items(&pattern, alias.as_deref())?);
            let values = scraper.build(&doc, &items, &options, update)?;
            save(&scraper, &rules_path)?;

            tracing::info!("Rules: {}", rules_path.display());
            println!("{}", serde_json::to_string_pretty(&values)?);
        }

        Commands::Extract {
            page,
            url,
            exact,
            best,
            group_by,
            keep_blank,
            keep_duplicates,
            keep_order,
            no_sibling_leaves,
            attr_fuzz_ratio,
        } => {
            let scraper = load(&rules_path)?;
            let doc = read_document(&page)?;
            let options = MatchOptions {
                attr_fuzz_ratio,
                base_url: base_url(url.as_deref())?,
                keep_blank,
                unique: !keep_duplicates,
                keep_order,
                contain_sibling_leaves: !no_sibling_leaves,
            };

            let output = if best {
                serde_json::to_value(scraper.get_result_best(&doc, &options))?
            } else if exact {
                render_result(&scraper.match_exact(&doc, &options), group_by, &options)
            } else {
                render_result(&scraper.match_similar(&doc, &options), group_by, &options)
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Commands::Rules { action } => {
            let mut scraper = load(&rules_path)?;
            match action {
                RulesAction::List => {
                    for rule in scraper.store() {
                        println!("{}", describe_rule(rule));
                    }
                }
                RulesAction::Remove { ids } => {
                    let ids: Vec<&str> = ids.iter().map(String::as_str).collect();
                    let removed = scraper.remove_rules(&ids);
                    save(&scraper, &rules_path)?;
                    println!("Removed {removed} rules, {} left", scraper.store().len());
                }
                RulesAction::Keep { ids } => {
                    let ids: Vec<&str> = ids.iter().map(String::as_str).collect();
                    let removed = scraper.keep_rules(&ids);
                    save(&scraper, &rules_path)?;
                    println!("Removed {removed} rules, {} left", scraper.store().len());
                }
                RulesAction::Alias { pairs } => {
                    let aliases = alias_pairs(&pairs)?;
                    for id in aliases.keys() {
                        if !scraper.store().contains(id) {
                            tracing::warn!("no rule with id {id}");
                        }
                    }
                    scraper.set_rule_aliases(&aliases);
                    save(&scraper, &rules_path)?;
                }
            }
        }

        Commands::Validate => match StackScraper::load(&rules_path) {
            Ok(scraper) => {
                let store = scraper.store();
                println!("Valid rules file: {}", rules_path.display());
                println!("  Rules: {}", store.len());
                println!(
                    "  Fuzzy: {}",
                    store.all().iter().filter(|r| r.is_fuzzy).count()
                );
                println!(
                    "  Attribute targets: {}",
                    store.all().iter().filter(|r| r.target != Target::Text).count()
                );
            }
            Err(e) => {
                eprintln!("Invalid rules file: {e}");
                std::process::exit(1);
            }
        },

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "stackscrape", &mut std::io::stdout());
        }
    }

    Ok(())
}
