use anyhow::Result;
use clap::Parser;
use imgmerge::{DEFAULT_HASH_SIZE, DecodePolicy, HashOptions, MergeOptions, RunSummary, TraversalOrder};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "imgmerge",
    version,
    about = "Remove duplicate images across two directories and optionally merge them"
)]
struct Cli {
    /// First image set; its copies win over the second set's
    #[arg(short = 'm', long, value_name = "DIR")]
    imgset1: PathBuf,

    /// Second image set
    #[arg(short = 'n', long, value_name = "DIR")]
    imgset2: PathBuf,

    /// Merge the deduplicated images into this directory
    #[arg(short, long, value_name = "DIR")]
    savedir: Option<PathBuf>,

    /// Rows of the hash grid (the grid is one column wider)
    #[arg(long, value_name = "N", default_value_t = DEFAULT_HASH_SIZE,
          value_parser = clap::value_parser!(u32).range(1..=8))]
    hash_size: u32,

    /// Order images are considered in; decides which copy of a duplicate is kept
    #[arg(long, value_enum, default_value_t = TraversalOrder::Walk)]
    order: TraversalOrder,

    /// What to do with an image that fails to decode
    #[arg(long, value_enum, default_value_t = DecodePolicy::Abort)]
    on_decode_error: DecodePolicy,

    /// Only show what would be deleted and written
    #[arg(long)]
    dry_run: bool,

    /// Append a JSON line per removed duplicate group to this file
    #[arg(long, value_name = "FILE")]
    history: Option<PathBuf>,

    /// Hide progress bars
    #[arg(short, long)]
    quiet: bool,
}

impl Cli {
    fn into_options(self) -> MergeOptions {
        MergeOptions {
            imgset1: self.imgset1,
            imgset2: self.imgset2,
            savedir: self.savedir,
            hash: HashOptions {
                hash_size: self.hash_size,
                decode_policy: self.on_decode_error,
            },
            order: self.order,
            dry_run: self.dry_run,
            history: self.history,
            show_progress: !self.quiet,
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let options = cli.into_options();

    println!(
        "▶ Deduplicating {} and {}",
        options.imgset1.display(),
        options.imgset2.display()
    );
    let summary = imgmerge::run(&options)?;
    print_summary(&summary, &options);
    Ok(())
}

fn print_summary(summary: &RunSummary, options: &MergeOptions) {
    let delete_verb = if summary.dry_run { "[dry-run] DELETE" } else { "Deleted" };

    println!(
        "▶ Hashed {} of {} image(s) into {} unique hash(es)",
        summary.images_hashed, summary.images_found, summary.unique_hashes
    );
    for path in &summary.skipped {
        println!("⚠️  Skipped unreadable {}", path.display());
    }

    if summary.resolved.is_empty() {
        println!("No duplicates found.");
    }
    for (i, group) in summary.resolved.iter().enumerate() {
        println!("\n✨ Group {} ({}):", i + 1, group.hash);
        println!("   🏆 Keeping → {}", group.retained.display());
        for dup in &group.removed {
            println!("   🗑️  {} {}", delete_verb, dup.display());
        }
    }

    if let (Some(merged), Some(dir)) = (&summary.merged, &options.savedir) {
        let write_verb = if summary.dry_run { "Would write" } else { "Wrote" };
        println!(
            "\n📦 {} {} image(s) to {}",
            write_verb,
            merged.len(),
            dir.display()
        );
        for item in merged {
            log::debug!("{} → {}", item.source.display(), item.destination.display());
        }
    }

    if summary.dry_run {
        println!("\n⚠️  Dry-run only; no files were changed.");
    } else {
        println!("\n✅ Removed {} duplicate(s)", summary.removed_count());
        if let Some(history) = &options.history {
            println!("✅ Recorded history in {}", history.display());
        }
    }
}
