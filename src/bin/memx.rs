//! CLI entry point for the `memx` command-line tool.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use memx::cli::commands;
use memx::config::{resolve_config, ConsolidationPolicy};
use memx::transport::StdioTransport;
use memx::{MemoryEngine, MemxError, MemxResult};

#[derive(Parser)]
#[command(
    name = "memx",
    about = "memx CLI: tiered memory consolidation engine for AI agents"
)]
struct Cli {
    /// Root directory of the memory store (default: $MEMX_HOME or ~/.memx)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Config file (default: <root>/config.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Project context (default: the current working directory)
    #[arg(long, global = true)]
    project: Option<String>,

    /// Output format: "text" (default) or "json"
    #[arg(long, global = true, default_value = "text")]
    format: String,

    /// Enable debug logging
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score and append an interaction
    Ingest {
        /// Interaction text ("-" reads stdin)
        content: String,
        /// user, assistant, system or tool
        #[arg(long, default_value = "user")]
        role: String,
        /// Target conversation (default: the project's active one)
        #[arg(long)]
        conversation: Option<String>,
    },
    /// Append to the current project's conversation
    Log {
        /// Interaction text ("-" reads stdin)
        content: String,
        #[arg(long, default_value = "user")]
        role: String,
    },
    /// Search episodic memory and the knowledge graph
    Retrieve {
        query: String,
        #[arg(long)]
        conversation: Option<String>,
        /// Maximum results
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Run the sleep cycle (all conversations unless --conversation is given)
    Consolidate {
        #[arg(long)]
        conversation: Option<String>,
        /// Promotion threshold; with --t-low, --retention and --prune-age overrides the configured policy
        #[arg(long, requires_all = ["t_low", "retention", "prune_age"])]
        t_high: Option<f32>,
        #[arg(long, requires_all = ["t_high", "retention", "prune_age"])]
        t_low: Option<f32>,
        /// Seconds before a low-surprise interaction is summarized
        #[arg(long, requires_all = ["t_high", "t_low", "prune_age"])]
        retention: Option<u64>,
        /// Seconds before a non-promoted interaction is pruned
        #[arg(long, requires_all = ["t_high", "t_low", "retention"])]
        prune_age: Option<u64>,
    },
    /// Add or update a knowledge node
    Node {
        label: String,
        #[arg(long)]
        description: Option<String>,
        /// Attributes as a JSON object
        #[arg(long)]
        attributes: Option<String>,
    },
    /// Relate two nodes (ids or labels)
    Edge {
        from: String,
        to: String,
        relation: String,
        /// Edge weight 0.0-1.0
        #[arg(long, default_value = "1.0")]
        weight: f32,
    },
    /// Breadth-first paths from a node (id or label)
    Traverse {
        start: String,
        #[arg(long)]
        max_hops: Option<u32>,
        #[arg(long)]
        min_weight: Option<f32>,
    },
    /// Compress text to a target ratio
    Compress {
        /// Text to compress ("-" reads stdin)
        text: String,
        #[arg(long, default_value = "0.5")]
        ratio: f32,
        #[arg(long)]
        instruction: Option<String>,
    },
    /// Archive the memory state
    Snapshot {
        /// Snapshot message
        message: Option<String>,
        /// List existing snapshots instead
        #[arg(long, conflicts_with = "message")]
        list: bool,
    },
    /// Recent activity across projects
    Activity {
        #[arg(long, default_value = "24")]
        hours: f64,
    },
    /// Show or change automatic logging of retrievals
    AutoIngest {
        /// Project key (default: current project)
        #[arg(long = "for")]
        project_key: Option<String>,
        /// Turn the global switch on
        #[arg(long, conflicts_with = "disable")]
        enable: bool,
        /// Turn the global switch off
        #[arg(long)]
        disable: bool,
        #[arg(long)]
        log_queries: Option<bool>,
        #[arg(long)]
        log_responses: Option<bool>,
    },
    /// Archive the active conversation and start a new one
    NewConversation {
        /// Project key (default: current project)
        #[arg(long = "for")]
        project_key: Option<String>,
    },
    /// Serve tool calls as line-delimited JSON on stdin/stdout
    Serve,
    /// List the tool surface
    Tools,
    /// Import a Markdown notes file
    Migrate {
        file: PathBuf,
        #[arg(long)]
        conversation: Option<String>,
        #[arg(long, default_value = "user")]
        role: String,
    },
    /// Recent interactions and digest of a conversation
    History {
        #[arg(long)]
        conversation: Option<String>,
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// List knowledge graph nodes
    Nodes {
        /// Include edges
        #[arg(long)]
        edges: bool,
    },
}

fn open_engine(cli: &Cli) -> MemxResult<MemoryEngine> {
    let mut config = resolve_config(cli.root.as_deref(), cli.config.as_deref())?;
    if let Some(project) = &cli.project {
        config.project_key = Some(project.clone());
    }
    if matches!(cli.command, Commands::Serve) {
        return MemoryEngine::open(config);
    }
    // One-shot commands never start the background scheduler.
    config.consolidation.schedule_interval_secs = None;
    MemoryEngine::open(config)
}

fn run(cli: Cli) -> MemxResult<()> {
    let json = cli.format == "json";
    if let Commands::Tools = cli.command {
        return commands::cmd_tools(json);
    }

    let engine = open_engine(&cli)?;
    let result = match cli.command {
        Commands::Ingest {
            content,
            role,
            conversation,
        } => {
            let role = commands::parse_role(&role)?;
            let content = commands::read_text_arg(&content)?;
            commands::cmd_ingest(&engine, conversation.as_deref(), role, &content, json)
        }
        Commands::Log { content, role } => {
            let role = commands::parse_role(&role)?;
            let content = commands::read_text_arg(&content)?;
            commands::cmd_log(&engine, &content, role, json)
        }
        Commands::Retrieve {
            query,
            conversation,
            top_k,
        } => commands::cmd_retrieve(&engine, &query, conversation.as_deref(), top_k, json),
        Commands::Consolidate {
            conversation,
            t_high,
            t_low,
            retention,
            prune_age,
        } => {
            let policy = match (t_high, t_low, retention, prune_age) {
                (Some(t_high), Some(t_low), Some(retention_age_secs), Some(prune_age_secs)) => {
                    Some(ConsolidationPolicy {
                        t_high,
                        t_low,
                        retention_age_secs,
                        prune_age_secs,
                    })
                }
                _ => None,
            };
            commands::cmd_consolidate(&engine, conversation.as_deref(), policy, json)
        }
        Commands::Node {
            label,
            description,
            attributes,
        } => commands::cmd_node(
            &engine,
            &label,
            description.as_deref(),
            attributes.as_deref(),
            json,
        ),
        Commands::Edge {
            from,
            to,
            relation,
            weight,
        } => commands::cmd_edge(&engine, &from, &to, &relation, weight, json),
        Commands::Traverse {
            start,
            max_hops,
            min_weight,
        } => commands::cmd_traverse(&engine, &start, max_hops, min_weight, json),
        Commands::Compress {
            text,
            ratio,
            instruction,
        } => commands::cmd_compress(&engine, &text, ratio, instruction.as_deref(), json),
        Commands::Snapshot { message, list } => match (list, message) {
            (true, _) => commands::cmd_snapshots(&engine, json),
            (false, Some(message)) => commands::cmd_snapshot(&engine, &message, json),
            (false, None) => Err(MemxError::Validation(
                "snapshot needs a message (or --list)".to_string(),
            )),
        },
        Commands::Activity { hours } => commands::cmd_activity(&engine, hours, json),
        Commands::AutoIngest {
            project_key,
            enable,
            disable,
            log_queries,
            log_responses,
        } => {
            let enabled = match (enable, disable) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            };
            if enabled.is_none() && log_queries.is_none() && log_responses.is_none() {
                commands::cmd_auto_ingest_status(&engine, project_key.as_deref(), json)
            } else {
                commands::cmd_auto_ingest_configure(
                    &engine,
                    project_key.as_deref(),
                    enabled,
                    log_queries,
                    log_responses,
                    json,
                )
            }
        }
        Commands::NewConversation { project_key } => {
            commands::cmd_new_conversation(&engine, project_key.as_deref(), json)
        }
        Commands::Serve => StdioTransport::new(&engine).run(),
        Commands::Tools => commands::cmd_tools(json),
        Commands::Migrate {
            file,
            conversation,
            role,
        } => {
            let role = commands::parse_role(&role)?;
            commands::cmd_migrate(&engine, &file, conversation.as_deref(), role, json)
        }
        Commands::History {
            conversation,
            limit,
        } => commands::cmd_history(&engine, conversation.as_deref(), limit, json),
        Commands::Nodes { edges } => commands::cmd_nodes(&engine, edges, json),
    };

    engine.shutdown()?;
    result
}

fn main() {
    let cli = Cli::parse();

    let mut logger = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    logger.target(env_logger::Target::Stderr);
    if cli.verbose {
        logger.filter_level(log::LevelFilter::Debug);
    }
    logger.init();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        let code = match &e {
            MemxError::Storage(_) | MemxError::Serialization(_) => 1,
            MemxError::Validation(_) | MemxError::InvalidTransition { .. } => 3,
            MemxError::NotFound { .. } | MemxError::ToolNotFound(_) => 4,
            _ => 5,
        };
        process::exit(code);
    }
}
