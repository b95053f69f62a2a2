use std::{ops::Range, path::PathBuf};

use lazytable_core::{
    region::RegionOfInterest,
    source::TableLength,
    table::{LazyTable, LengthMode, PrefetchConfig},
};
use rustyline::{DefaultEditor, error::ReadlineError};
use snafu::ResultExt;
use tokio::runtime::Handle;

use crate::{
    OpenedTable,
    error::{CliError, CliResult, ReadlineSnafu},
    expr::parse_filter,
    render::{Labels, render_cycle, render_header, render_row, render_stats},
};

const DEFAULT_TAKE: usize = 10;

#[derive(Debug, PartialEq, Eq)]
enum CommandAction {
    Continue,
    Break,
}

struct ShellContext {
    handle: Handle,
    root: LazyTable,
    view: LazyTable,
    labels: Labels,
    filters: Vec<String>,
    prefetch: PrefetchConfig,
    description: String,
}

impl ShellContext {
    fn new(handle: Handle, opened: OpenedTable, prefetch: PrefetchConfig) -> Self {
        Self {
            handle,
            view: opened.table.clone(),
            root: opened.table,
            labels: opened.labels,
            filters: Vec::new(),
            prefetch,
            description: opened.description,
        }
    }

    fn prompt(&self) -> String {
        match (self.filters.len(), self.root.is_prefetching()) {
            (0, false) => "lazytable> ".to_string(),
            (0, true) => "lazytable(prefetch)> ".to_string(),
            (n, false) => format!("lazytable[{n} filters]> "),
            (n, true) => format!("lazytable[{n} filters](prefetch)> "),
        }
    }
}

fn print_help() {
    println!(
        r#"commands:
  row <N>                  show row N of the current view
  take [N]                 show the first N rows (default 10)
  filter <EXPR>            derive a filtered view, e.g. `a > 1.5`, `class == beta`, `b in -1..1`
  reset                    drop all filters
  roi rows <A>..<B>        restrict the region of interest to rows A..B
  roi attr <NAME> <LO> <HI>
                           restrict the region of interest to LO <= NAME <= HI
  roi clear                region of interest covers everything again
  pull [N]                 run N prefetch cycles in the foreground (default 1)
  prefetch start|stop      background prefetching
  status                   lengths, coverage and prefetch state
  stats                    statistics over materialized rows
  help
  exit | quit"#
    );
}

fn parse_rows(raw: &str) -> Result<Range<u64>, String> {
    let (lo, hi) = raw
        .split_once("..")
        .ok_or_else(|| format!("expected A..B, got '{raw}'"))?;
    let lo = lo
        .trim()
        .parse::<u64>()
        .map_err(|_| format!("'{lo}' is not a row index"))?;
    let hi = hi
        .trim()
        .parse::<u64>()
        .map_err(|_| format!("'{hi}' is not a row index"))?;
    if lo > hi {
        return Err(format!("empty range {lo}..{hi}"));
    }
    Ok(lo..hi)
}

fn parse_count(raw: Option<&str>, default: usize) -> Result<usize, String> {
    match raw {
        None => Ok(default),
        Some(raw) => raw
            .parse::<usize>()
            .map_err(|_| format!("'{raw}' is not a count")),
    }
}

fn cmd_row(ctx: &ShellContext, arg: &str) {
    let index = match arg.parse::<u64>() {
        Ok(i) => i,
        Err(_) => {
            println!("usage: row <N>");
            return;
        }
    };
    println!("{}", render_header(ctx.view.domain()));
    match ctx.view.get(index).and_then(|row| render_row(&row, &ctx.labels)) {
        Ok(line) => println!("{line}"),
        Err(e) => println!("{e}"),
    }
}

fn cmd_take(ctx: &ShellContext, count: usize) {
    println!("{}", render_header(ctx.view.domain()));
    for row in ctx.view.iter().take(count) {
        match row.and_then(|row| render_row(&row, &ctx.labels)) {
            Ok(line) => println!("{line}"),
            Err(e) => println!("error: {e}"),
        }
    }
}

fn cmd_filter(ctx: &mut ShellContext, expr: &str) {
    let predicate = match parse_filter(expr, ctx.view.domain(), &ctx.labels) {
        Ok(p) => p,
        Err(e) => {
            println!("{e}");
            return;
        }
    };
    match ctx.view.derive(predicate) {
        Ok(view) => {
            ctx.view = view;
            ctx.filters.push(expr.to_string());
            println!("filters: {}", ctx.filters.join(" && "));
        }
        Err(e) => println!("{e}"),
    }
}

fn cmd_roi(ctx: &ShellContext, args: &[&str]) {
    let current = ctx.root.region_of_interest();
    let region = match args {
        ["clear"] => RegionOfInterest::everything(),
        ["rows", range] => match parse_rows(range) {
            Ok(rows) => current.with_rows(rows),
            Err(e) => {
                println!("{e}");
                return;
            }
        },
        ["attr", name, lo, hi] => match (lo.parse::<f64>(), hi.parse::<f64>()) {
            (Ok(lo), Ok(hi)) => current.with_bound(*name, lo, hi),
            _ => {
                println!("usage: roi attr <NAME> <LO> <HI>");
                return;
            }
        },
        _ => {
            println!("usage: roi rows <A>..<B> | roi attr <NAME> <LO> <HI> | roi clear");
            return;
        }
    };
    match ctx.root.set_region_of_interest(region) {
        Ok(()) => println!("region: {}", describe_region(&ctx.root.region_of_interest())),
        Err(e) => println!("{e}"),
    }
}

fn describe_region(region: &RegionOfInterest) -> String {
    if region.is_everything() {
        return "everything".to_string();
    }
    let mut parts = Vec::new();
    if let Some(rows) = region.rows() {
        parts.push(format!("rows {}..{}", rows.start, rows.end));
    }
    for bound in region.bounds() {
        parts.push(format!("{} in {}..{}", bound.attribute, bound.lo, bound.hi));
    }
    parts.join(", ")
}

fn cmd_pull(ctx: &ShellContext, cycles: usize) {
    for _ in 0..cycles {
        match ctx.view.prefetch_once(&ctx.prefetch) {
            Ok(report) => {
                println!("{}", render_cycle(&report));
                if report.exhausted {
                    break;
                }
            }
            Err(e) => {
                println!("{e}");
                break;
            }
        }
    }
}

fn cmd_prefetch(ctx: &ShellContext, arg: &str) {
    match arg {
        "start" => {
            let _guard = ctx.handle.enter();
            match ctx.root.start_prefetch(ctx.prefetch.clone()) {
                Ok(()) => println!(
                    "prefetch: on (every {} ms, {} rows per cycle)",
                    ctx.prefetch.interval_ms, ctx.prefetch.batch_rows
                ),
                Err(e) => println!("{e}"),
            }
        }
        "stop" => {
            ctx.root.stop_prefetch();
            println!("prefetch: off");
        }
        _ => println!("usage: prefetch start|stop"),
    }
}

fn cmd_status(ctx: &ShellContext) {
    println!("source: {}", ctx.description);
    match ctx.root.len(LengthMode::Full) {
        Ok(len) => println!("rows: {len}"),
        Err(e) => println!("rows: {e}"),
    }
    println!("materialized: {}", ctx.root.materialized_len());
    if let Some(rows) = ctx.root.region_of_interest().rows()
        && rows.start < rows.end
    {
        println!(
            "region coverage: {:.1}%",
            ctx.root.coverage_ratio(rows.clone()) * 100.0
        );
    }
    println!(
        "region: {}",
        describe_region(&ctx.root.region_of_interest())
    );
    if !ctx.filters.is_empty() {
        let (scanned, matched) = ctx.view.scan_progress();
        println!("filters: {}", ctx.filters.join(" && "));
        println!("view: {matched} matches in {scanned} scanned rows");
        if let Ok(TableLength::Finite(n)) = ctx.view.len(LengthMode::Materialized) {
            println!("view materialized: {n}");
        }
    }
    println!(
        "prefetch: {}",
        if ctx.root.is_prefetching() { "on" } else { "off" }
    );
}

fn process_command(ctx: &mut ShellContext, trimmed: &str) -> CommandAction {
    let mut words = trimmed.split_whitespace();
    let Some(command) = words.next() else {
        return CommandAction::Continue;
    };
    let rest = trimmed[command.len()..].trim();
    let args: Vec<&str> = words.collect();

    match command {
        "exit" | "quit" => return CommandAction::Break,
        "help" => print_help(),
        "row" => cmd_row(ctx, rest),
        "take" => match parse_count(args.first().copied(), DEFAULT_TAKE) {
            Ok(n) => cmd_take(ctx, n),
            Err(e) => println!("{e}"),
        },
        "filter" if !rest.is_empty() => cmd_filter(ctx, rest),
        "filter" => println!("usage: filter <EXPR>"),
        "reset" => {
            ctx.view = ctx.root.clone();
            ctx.filters.clear();
            println!("filters: none");
        }
        "roi" => cmd_roi(ctx, &args),
        "pull" => match parse_count(args.first().copied(), 1) {
            Ok(n) => cmd_pull(ctx, n),
            Err(e) => println!("{e}"),
        },
        "prefetch" => cmd_prefetch(ctx, rest),
        "status" => cmd_status(ctx),
        "stats" => println!("{}", render_stats(&ctx.view.stats())),
        _ => println!("unknown command. type 'help'."),
    }
    CommandAction::Continue
}

fn shell_blocking(
    handle: Handle,
    opened: OpenedTable,
    prefetch: PrefetchConfig,
    history: Option<PathBuf>,
) -> CliResult<()> {
    let mut ctx = ShellContext::new(handle, opened, prefetch);
    let mut rl = DefaultEditor::new().context(ReadlineSnafu)?;

    // history best-effort
    if let Some(path) = &history {
        let _ = rl.load_history(path);
    }

    println!("lazytable shell");
    println!("source: {}", ctx.description);
    println!("type 'help' for commands\n");

    loop {
        let line = match rl.readline(&ctx.prompt()) {
            Ok(l) => l,
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                break;
            }
            Err(ReadlineError::Eof) => {
                println!("^D");
                break;
            }
            Err(e) => {
                println!("readline error: {e}");
                break;
            }
        };

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let _ = rl.add_history_entry(trimmed);

        if process_command(&mut ctx, trimmed) == CommandAction::Break {
            break;
        }
    }

    ctx.root.teardown();
    if let Some(path) = &history {
        let _ = rl.save_history(path);
    }
    Ok(())
}

/// Run an interactive shell in a blocking thread (rustyline is blocking).
pub async fn cmd_shell(
    opened: OpenedTable,
    prefetch: PrefetchConfig,
    history: Option<PathBuf>,
) -> CliResult<()> {
    let handle = Handle::current();

    tokio::task::spawn_blocking(move || shell_blocking(handle, opened, prefetch, history))
        .await
        .map_err(|e| CliError::ShellThread {
            message: e.to_string(),
        })??;

    Ok(())
}
