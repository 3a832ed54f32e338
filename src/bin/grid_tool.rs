//! Grid inspection tool: prints statistics for a persisted voxel grid and
//! optionally compacts and rewrites it.
//!
//! Usage: cargo run --release --bin grid_tool -- --input <FILE> [OPTIONS]
//!
//! Options:
//!   --input <FILE>    Grid file: compressed `.cgc` or a `.json` tree document
//!   --compact         Drop unreferenced palette entries before writing
//!   --output <FILE>   Write the (possibly compacted) grid; `.json` writes a
//!                     tree document, anything else the compressed form

use std::path::{Path, PathBuf};
use std::process;

use chiselgrid::core::Result;
use chiselgrid::voxel::{VoxelGrid, compress_grid, decompress_grid};

fn main() {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info"),
    )
    .format_timestamp_millis()
    .init();

    let args: Vec<String> = std::env::args().collect();
    let Some(input) = parse_str_arg(&args, "--input").map(PathBuf::from) else {
        eprintln!("Usage: grid_tool --input <FILE> [--compact] [--output <FILE>]");
        process::exit(2);
    };
    let compact = has_flag(&args, "--compact");
    let output = parse_str_arg(&args, "--output").map(PathBuf::from);

    if let Err(err) = run(&input, compact, output.as_deref()) {
        eprintln!("Error: {}", err);
        process::exit(1);
    }
}

fn run(input: &Path, compact: bool, output: Option<&Path>) -> Result<()> {
    let mut grid = read_grid(input)?;

    println!("=== Grid: {} ===", input.display());
    print_statistics(&grid);

    if compact {
        let removed = grid.compact();
        println!();
        println!("Compacted: removed {} palette entries", removed);
        print_statistics(&grid);
    }

    if let Some(output) = output {
        write_grid(output, &grid)?;
        println!();
        println!("Wrote {}", output.display());
    }
    Ok(())
}

fn is_json(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "json")
}

fn read_grid(path: &Path) -> Result<VoxelGrid> {
    let bytes = std::fs::read(path)?;
    if is_json(path) {
        let value: serde_json::Value = serde_json::from_slice(&bytes)?;
        VoxelGrid::from_tree(&value)
    } else {
        decompress_grid(&bytes)
    }
}

fn write_grid(path: &Path, grid: &VoxelGrid) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    if is_json(path) {
        std::fs::write(path, serde_json::to_string_pretty(&grid.to_tree())?)?;
    } else {
        std::fs::write(path, compress_grid(grid))?;
    }
    Ok(())
}

fn print_statistics(grid: &VoxelGrid) {
    let stats = grid.statistics();
    println!("Side:          {}", grid.geometry().bits_per_side());
    println!("Palette:       {} entries", grid.palette().len());
    println!("Voxels:        {} filled / {}", stats.filled(), stats.total());
    println!("Primary state: {}", stats.primary_state());
    for entry in stats.state_counts() {
        println!("  {:<24} {:>8}", entry.descriptor.to_string(), entry.count);
    }
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

fn parse_str_arg(args: &[String], flag: &str) -> Option<String> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}
