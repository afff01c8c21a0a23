//! # Sardonyx Mirror
//!
//! A standalone CLI that walks through change-batch replay.
//! A `ChangeSource` owns the authoritative list; mirrors never see the list
//! itself, only the batches it emits.
//!
//! ## Addressing conventions
//!
//! ```text
//! original:  every index points into the list as it was before the batch
//! live:      removals point into the list as it shrinks, additions point
//!            into the list after all removals
//! ```

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use clap::{Parser, Subcommand};
use colored::*;
use icb_core::{
    apply, Addressing, ChangeBatch, ChangeItem, ChangeSource, ListEvent, SourceId,
};

// ─── CLI ───────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "sardonyx-mirror")]
#[command(about = "Change-batch replay walkthrough (Sardonyx)")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Basic demo: one source, two mirrors fed by emitted batches
    Demo,
    /// Scattered batch: removals and insertions far apart, original addressing
    Scatter,
    /// Live addressing: sequential removals and the insertion compensation rule
    Live,
    /// Interactive REPL for manual experimentation
    Interactive,
}

// ─── Mirror: a list fed only by batches ────────────────────────────────────

/// A named mirror that replays every batch it is handed.
struct Mirror {
    name: String,
    addressing: Addressing,
    items: Vec<String>,
}

impl Mirror {
    fn new(name: &str, addressing: Addressing, seed: Vec<String>) -> Self {
        Self {
            name: name.to_string(),
            addressing,
            items: seed,
        }
    }

    fn replay(&mut self, batch: ChangeBatch<String>) {
        if let Err(e) = apply(&mut self.items, batch, self.addressing) {
            println!("  {} {} rejected batch: {}", "!".bright_red(), self.name, e);
        }
    }
}

type SharedMirror = Arc<Mutex<Mirror>>;

/// Subscribe a mirror to a source so every emitted batch is replayed.
fn attach(source: &mut ChangeSource<String>, mirror: &SharedMirror) {
    let mirror = Arc::clone(mirror);
    source.subscribe(move |event| {
        if let ListEvent::ItemsChanged(batch) = event {
            if let Ok(mut m) = mirror.lock() {
                m.replay(batch.clone());
            }
        }
    });
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

// ─── Pretty printing ──────────────────────────────────────────────────────

fn header(text: &str) {
    let bar = "═".repeat(60);
    println!("\n{}", bar.bright_cyan());
    println!("  {}", text.bold().bright_white());
    println!("{}", bar.bright_cyan());
}

fn section(text: &str) {
    println!("\n{} {}", "▸".bright_yellow(), text.bold());
}

fn step(text: &str) {
    println!("  {} {}", "•".bright_green(), text);
}

fn show_list(name: &str, items: &[String]) {
    let rendered: Vec<String> = items
        .iter()
        .enumerate()
        .map(|(i, item)| format!("{}{}", i.to_string().dimmed(), item))
        .collect();
    println!(
        "  {:<10} [{}]",
        name.bright_magenta(),
        rendered.join(", ")
    );
}

fn show_batch(batch: &ChangeBatch<String>, addressing: Addressing) {
    let fmt = |items: &[ChangeItem<String>]| {
        items
            .iter()
            .map(|c| format!("({}@{})", c.payload, c.index))
            .collect::<Vec<_>>()
            .join(" ")
    };
    println!(
        "  {} {} removed: {}  added: {}",
        "batch".bright_cyan(),
        format!("[{}]", addressing).dimmed(),
        fmt(&batch.removed).bright_red(),
        fmt(&batch.added).bright_green()
    );
}

/// Print a failed step. Returns whether the step succeeded.
fn report<T, E: std::fmt::Display>(what: &str, outcome: Result<T, E>) -> bool {
    match outcome {
        Ok(_) => true,
        Err(e) => {
            step(&format!("{} failed: {}", what, e).bright_red().to_string());
            false
        }
    }
}

fn convergence_result(converged: bool) {
    if converged {
        println!(
            "\n  {} {}",
            "✓".bright_green().bold(),
            "ALL MIRRORS MATCH THE SOURCE".bright_green().bold()
        );
    } else {
        println!(
            "\n  {} {}",
            "✗".bright_red().bold(),
            "DIVERGENCE DETECTED, a mirror differs from the source!"
                .bright_red()
                .bold()
        );
    }
}

fn mirrors_match(source: &ChangeSource<String>, mirrors: &[&SharedMirror]) -> bool {
    let expected = source.snapshot();
    mirrors
        .iter()
        .all(|m| m.lock().map(|m| m.items == expected).unwrap_or(false))
}

fn show_all(source: &ChangeSource<String>, mirrors: &[&SharedMirror]) {
    show_list("source", &source.snapshot());
    for mirror in mirrors {
        if let Ok(m) = mirror.lock() {
            show_list(&m.name, &m.items);
        }
    }
}

// ─── Demo ──────────────────────────────────────────────────────────────────

fn run_demo() {
    header("DEMO: Source emits, mirrors replay");

    let seed = words(&["intro", "verse", "chorus"]);
    let mut source = ChangeSource::new(SourceId::new("setlist"), seed.clone());
    let live = Arc::new(Mutex::new(Mirror::new("live", Addressing::Live, seed.clone())));
    let original = Arc::new(Mutex::new(Mirror::new("original", Addressing::Original, seed)));
    attach(&mut source, &live);
    attach(&mut source, &original);

    source.subscribe(|event| match event {
        ListEvent::ItemsChanged(batch) => show_batch(batch, Addressing::Original),
        ListEvent::EditingEnabledChanged(on) => step(&format!("editing enabled → {}", on)),
        ListEvent::ItemSelected(item) => step(&format!("selected {}", item)),
        ListEvent::AddRequested => step("add requested"),
    });

    section("Phase 1: Initial state");
    show_all(&source, &[&live, &original]);

    section("Phase 2: Single-item mutations");
    source.set_editing_enabled(true);
    source.set_editing_enabled(true);
    report("insert bridge at 2", source.insert("bridge".to_string(), 2));
    report("append outro", source.append("outro".to_string()));
    report("remove intro", source.remove(&"intro".to_string()));
    report("remove at 0", source.remove_at(0));
    source.notify_selected("chorus".to_string());
    source.request_new_item();

    section("Phase 3: Rejected mutations emit nothing");
    match source.insert("encore".to_string(), 99) {
        Ok(()) => step("unexpected success"),
        Err(e) => step(&format!("insert at 99: {}", e)),
    }
    match source.remove(&"encore".to_string()) {
        Ok(_) => step("unexpected success"),
        Err(e) => step(&format!("remove encore: {}", e)),
    }

    section("Phase 4: Post-mutation state");
    show_all(&source, &[&live, &original]);
    convergence_result(mirrors_match(&source, &[&live, &original]));
}

// ─── Scatter ───────────────────────────────────────────────────────────────

fn run_scatter() {
    header("SCATTER: Mixed removals and insertions, original addressing");

    section("Case 1: replace in place");
    let mut mirror = words(&["a", "b", "c", "d"]);
    show_list("before", &mirror);
    let batch = ChangeBatch::new(
        vec![ChangeItem::new("x".to_string(), 1)],
        vec![ChangeItem::new("b".to_string(), 1)],
    );
    show_batch(&batch, Addressing::Original);
    if let Err(e) = apply(&mut mirror, batch, Addressing::Original) {
        step(&format!("rejected: {}", e));
    }
    show_list("after", &mirror);

    section("Case 2: drop the head, add at the old end");
    let mut mirror = words(&["a", "b", "c"]);
    show_list("before", &mirror);
    let batch = ChangeBatch::new(
        vec![ChangeItem::new("y".to_string(), 2)],
        vec![ChangeItem::new("a".to_string(), 0)],
    );
    show_batch(&batch, Addressing::Original);
    if let Err(e) = apply(&mut mirror, batch, Addressing::Original) {
        step(&format!("rejected: {}", e));
    }
    show_list("after", &mirror);

    section("Case 3: add at 50 while removing 10 in a 60-item list");
    let mut mirror: Vec<String> = (0..60).map(|i| format!("n{}", i)).collect();
    let batch = ChangeBatch::new(
        vec![ChangeItem::new("NEW".to_string(), 50)],
        vec![ChangeItem::new("n10".to_string(), 10)],
    );
    show_batch(&batch, Addressing::Original);
    if let Err(e) = apply(&mut mirror, batch, Addressing::Original) {
        step(&format!("rejected: {}", e));
    }
    let landed = mirror.iter().position(|s| s == "NEW");
    step(&format!(
        "NEW landed at index {} (expected 49)",
        landed.map(|i| i.to_string()).unwrap_or_else(|| "?".into())
    ));

    section("Case 4: a duplicated removal is refused, mirror untouched");
    let mut mirror = words(&["a", "b"]);
    let batch = ChangeBatch::new(
        Vec::new(),
        vec![
            ChangeItem::new("a".to_string(), 0),
            ChangeItem::new("a".to_string(), 0),
        ],
    );
    show_batch(&batch, Addressing::Original);
    match apply(&mut mirror, batch, Addressing::Original) {
        Ok(()) => step("unexpectedly accepted"),
        Err(e) => step(&format!("rejected: {}", e)),
    }
    show_list("after", &mirror);
}

// ─── Live ──────────────────────────────────────────────────────────────────

fn run_live() {
    header("LIVE: Sequential addressing");

    section("Case 1: removing index 1 twice removes two neighbours");
    let mut mirror = words(&["a", "b", "c", "d"]);
    show_list("before", &mirror);
    let batch = ChangeBatch::new(
        Vec::new(),
        vec![
            ChangeItem::new("b".to_string(), 1),
            ChangeItem::new("c".to_string(), 1),
        ],
    );
    show_batch(&batch, Addressing::Live);
    if let Err(e) = apply(&mut mirror, batch, Addressing::Live) {
        step(&format!("rejected: {}", e));
    }
    show_list("after", &mirror);

    section("Case 2: insertion compensation follows sequence position");
    let mut mirror = words(&["a", "b", "c", "d"]);
    show_list("before", &mirror);
    let batch = ChangeBatch::new(
        vec![
            ChangeItem::new("x".to_string(), 3),
            ChangeItem::new("y".to_string(), 2),
        ],
        vec![ChangeItem::new("a".to_string(), 0)],
    );
    show_batch(&batch, Addressing::Live);
    if let Err(e) = apply(&mut mirror, batch, Addressing::Live) {
        step(&format!("rejected: {}", e));
    }
    show_list("after", &mirror);
    step("x (first addition) is not shifted; y (second) is shifted back by one");
}

// ─── Interactive REPL ──────────────────────────────────────────────────────

fn run_interactive() {
    header("INTERACTIVE REPL: Sardonyx Mirror");

    let mut source = ChangeSource::new(SourceId::new("repl"), Vec::<String>::new());
    let live = Arc::new(Mutex::new(Mirror::new("live", Addressing::Live, Vec::new())));
    let original = Arc::new(Mutex::new(Mirror::new("original", Addressing::Original, Vec::new())));
    attach(&mut source, &live);
    attach(&mut source, &original);
    source.subscribe(|event| {
        if let ListEvent::ItemsChanged(batch) = event {
            show_batch(batch, Addressing::Original);
        }
    });

    println!();
    println!("  {}", "Commands:".bold().underline());
    println!("    {} <item> <index>         Insert at index", "insert".bright_cyan());
    println!("    {} <item>                 Append at end", "append".bright_cyan());
    println!("    {} <item>                 Remove first match", "remove".bright_cyan());
    println!("    {} <index>                Remove at index", "removeat".bright_cyan());
    println!("    {}                        Show source and mirrors", "show".bright_cyan());
    println!("    {}                        Check convergence", "check".bright_cyan());
    println!("    {}                        Exit", "quit".bright_cyan());
    println!();

    loop {
        print!("{} ", "sardonyx>".bright_cyan().bold());
        let _ = io::stdout().flush();

        let mut line = String::new();
        match io::stdin().read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                println!("  {} {}", "!".bright_red(), e);
                break;
            }
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        let Some(&command) = parts.first() else {
            continue;
        };

        let outcome = match (command, parts.len()) {
            ("insert", 3) => match parts[2].parse::<usize>() {
                Ok(index) => source.insert(parts[1].to_string(), index).map(|_| ()),
                Err(_) => {
                    println!("  {} index must be a number", "!".bright_red());
                    continue;
                }
            },
            ("append", 2) => source.append(parts[1].to_string()),
            ("remove", 2) => source.remove(&parts[1].to_string()).map(|_| ()),
            ("removeat", 2) => match parts[1].parse::<usize>() {
                Ok(index) => source.remove_at(index).map(|_| ()),
                Err(_) => {
                    println!("  {} index must be a number", "!".bright_red());
                    continue;
                }
            },
            ("show", _) => {
                show_all(&source, &[&live, &original]);
                continue;
            }
            ("check", _) => {
                convergence_result(mirrors_match(&source, &[&live, &original]));
                continue;
            }
            ("quit" | "exit" | "q", _) => {
                println!("  {}", "Goodbye!".dimmed());
                break;
            }
            ("help" | "h" | "?", _) => {
                println!("  insert <item> <i> | append <item> | remove <item> | removeat <i>");
                println!("  show | check | quit");
                continue;
            }
            (other, _) => {
                println!(
                    "  {} Unknown command '{}', type 'help'",
                    "?".bright_yellow(),
                    other
                );
                continue;
            }
        };

        if let Err(e) = outcome {
            println!("  {} {}", "!".bright_red(), e);
        }
    }
}

// ─── Entry point ───────────────────────────────────────────────────────────

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Demo => run_demo(),
        Commands::Scatter => run_scatter(),
        Commands::Live => run_live(),
        Commands::Interactive => run_interactive(),
    }
}
