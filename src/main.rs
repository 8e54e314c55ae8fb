use std::path::PathBuf;

use anyhow::bail;
use clap::{command, value_parser, Arg, ArgAction, ArgMatches, Command};
use context::Context;
use log::{info, warn};
use planner::Plan;

mod applier;
mod console;
mod context;
mod frontmatter;
mod history;
mod index;
mod metadata;
mod planner;
mod redirects;
mod report;
mod selector;

const POST_EXTENSION: &str = "md";
const DATE_KEY: &str = "date";

fn posts_dir_arg() -> Arg {
    Arg::new("posts_dir")
        .long("posts-dir")
        .short('d')
        .help(format!(
            "Directory of posts [env: {}] [default: {}]",
            context::POSTS_DIR_ENV,
            context::DEFAULT_POSTS_DIR
        ))
        .value_parser(value_parser!(PathBuf))
}

fn batch_args() -> [Arg; 3] {
    [
        Arg::new("apply")
            .long("apply")
            .help("Write the changes. Without it only the plan is shown.")
            .action(ArgAction::SetTrue),
        Arg::new("yes")
            .long("yes")
            .short('y')
            .help("Don't ask for confirmation with --apply")
            .action(ArgAction::SetTrue),
        Arg::new("report")
            .long("report")
            .help("Write the plan (and its outcome) as JSON to this file")
            .value_parser(value_parser!(PathBuf)),
    ]
}

fn cli() -> Command {
    command!()
        .subcommand_required(true)
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("More logging (-v debug, -vv trace). RUST_LOG wins when set.")
                .action(ArgAction::Count)
                .global(true),
        )
        .subcommand(
            Command::new("ids")
                .about("Write redirect target ids into post front-matter")
                .arg(posts_dir_arg())
                .arg(
                    Arg::new("redirects")
                        .long("redirects")
                        .short('r')
                        .help("Redirect rule file")
                        .value_parser(value_parser!(PathBuf))
                        .default_value("_redirects"),
                )
                .arg(
                    Arg::new("key")
                        .long("key")
                        .help("Front-matter key to write")
                        .default_value("id"),
                )
                .arg(
                    Arg::new("match_key")
                        .long("match-key")
                        .help("Front-matter key holding the old id")
                        .default_value("id"),
                )
                .args(batch_args()),
        )
        .subcommand(
            Command::new("relocate")
                .about("Move posts into YYYY/MM directories by their date")
                .arg(posts_dir_arg())
                .arg(
                    Arg::new("recursive")
                        .long("recursive")
                        .help("Also consider posts in subdirectories")
                        .action(ArgAction::SetTrue),
                )
                .args(batch_args()),
        )
        .subcommand(
            Command::new("updated")
                .about("Pick an `updated` time from git history for posts lacking one")
                .arg(posts_dir_arg())
                .arg(
                    Arg::new("key")
                        .long("key")
                        .help("Front-matter key to fill")
                        .default_value("updated"),
                )
                .arg(
                    Arg::new("preview")
                        .long("preview")
                        .help("Don't write files, only show the choice")
                        .action(ArgAction::SetTrue),
                ),
        )
}

fn init_logger(verbosity: u8) {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn batch_context(matches: &ArgMatches) -> anyhow::Result<Context> {
    Context::init(
        matches.get_one::<PathBuf>("posts_dir").cloned(),
        matches.get_flag("apply"),
        matches.get_flag("yes"),
        matches.get_one::<PathBuf>("report").cloned(),
    )
}

fn get_str<'a>(matches: &'a ArgMatches, id: &str) -> &'a str {
    matches.get_one::<String>(id).map_or("", String::as_str)
}

fn run_ids(matches: &ArgMatches) -> anyhow::Result<()> {
    let ctx = batch_context(matches)?;
    let Some(redirects_path) = matches.get_one::<PathBuf>("redirects") else {
        bail!("redirect file is required");
    };
    if !redirects_path.is_file() {
        bail!("redirect file does not exist: {:?}", redirects_path);
    }
    let key = get_str(matches, "key");
    let match_key = get_str(matches, "match_key");

    let rules = redirects::load(redirects_path)?;
    info!("{} post redirects in {:?}", rules.len(), redirects_path);

    let paths = index::find_documents(&ctx.posts_dir, POST_EXTENSION, true)?;
    let index = index::DocumentIndex::build(index::load_documents(&paths), match_key);
    info!(
        "{} readable posts under {:?}, indexed by `{}`",
        index.documents().len(),
        ctx.posts_dir,
        index.key()
    );

    let plan = planner::plan_field_updates(&rules, &index, key);
    finish(&ctx, "ids", plan)
}

fn run_relocate(matches: &ArgMatches) -> anyhow::Result<()> {
    let ctx = batch_context(matches)?;
    let recursive = matches.get_flag("recursive");

    let paths = index::find_documents(&ctx.posts_dir, POST_EXTENSION, recursive)?;
    if paths.is_empty() {
        println!("No posts found in {}", ctx.posts_dir.display());
        return Ok(());
    }
    info!("{} posts under {:?}", paths.len(), ctx.posts_dir);
    let documents = index::load_documents(&paths);

    let plan = planner::plan_relocations(&documents, &ctx.posts_dir, DATE_KEY);
    finish(&ctx, "relocate", plan)
}

fn finish(ctx: &Context, command: &str, plan: Plan) -> anyhow::Result<()> {
    println!(
        "{} change(s) planned, {} item(s) skipped.",
        plan.mutations.len(),
        plan.skipped.len()
    );
    for mutation in &plan.mutations {
        println!("  {}", mutation.describe(&ctx.posts_dir));
    }

    if plan.is_empty() || !ctx.apply {
        if !plan.is_empty() {
            println!("\nThis is a dry run. Use --apply to write the changes.");
        }
        if let Some(report_path) = &ctx.report {
            report::save_report(report_path, command, &plan, None)?;
        }
        return Ok(());
    }

    if !ctx.yes {
        let stdin = std::io::stdin();
        let confirmed = console::confirm(
            &mut stdin.lock(),
            &mut std::io::stdout(),
            "Apply the changes above?",
        )?;
        if !confirmed {
            println!("Cancelled.");
            return Ok(());
        }
    }

    let result = applier::apply(&plan.mutations);
    println!(
        "\nDone: {} applied, {} unchanged, {} conflict(s), {} failure(s).",
        result.applied, result.unchanged, result.conflicts, result.failures
    );
    if let Some(report_path) = &ctx.report {
        report::save_report(report_path, command, &plan, Some(&result))?;
    }
    Ok(())
}

fn run_updated(matches: &ArgMatches) -> anyhow::Result<()> {
    let ctx = Context::init(
        matches.get_one::<PathBuf>("posts_dir").cloned(),
        false,
        false,
        None,
    )?;
    let preview = matches.get_flag("preview");

    let paths = index::find_documents(&ctx.posts_dir, POST_EXTENSION, true)?;
    if paths.is_empty() {
        println!("No posts found in {}", ctx.posts_dir.display());
        return Ok(());
    }
    println!("Found {} posts under {}", paths.len(), ctx.posts_dir.display());

    let git = history::Git::discover(&ctx.posts_dir);
    info!("Reading history from {:?}", git.root());

    let stdin = std::io::stdin();
    let mut selector = selector::Selector {
        history: &git,
        input: stdin.lock(),
        output: std::io::stdout(),
        key: get_str(matches, "key").to_string(),
        anchor: DATE_KEY.to_string(),
        preview,
    };

    let mut modified = 0;
    for path in &paths {
        match selector.process(path) {
            Ok(selector::Outcome::Written(_) | selector::Outcome::Previewed(_)) => modified += 1,
            Ok(_) => {}
            Err(e) => warn!("Skipping {}: {e:#}", ctx.display(path)),
        }
    }
    println!("\nDone. {} post(s) {}.", modified, if preview { "previewed" } else { "modified" });

    Ok(())
}

fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();
    init_logger(matches.get_count("verbose"));

    match matches.subcommand() {
        Some(("ids", sub)) => run_ids(sub),
        Some(("relocate", sub)) => run_relocate(sub),
        Some(("updated", sub)) => run_updated(sub),
        _ => unreachable!("subcommand_required"),
    }
}
