use std::fs::File;
use std::io::BufWriter;
use std::process::exit;

use clap::Parser;

use cg_graph::dot::graph_to_dot;
use cg_graph::graph::{BuildSettings, ConnectedGraph};
use cg_graph::utils::{get_all_input_ops, get_all_output_ops};

#[derive(Debug, clap::Parser)]
struct Args {
    /// Write a GraphViz rendering of the graph to this path.
    #[clap(short, long)]
    dot: Option<String>,
    /// Keep tensors with multiple consumers as they are instead of inserting split ops.
    #[clap(long)]
    no_splits: bool,

    path: String,
}

fn main() {
    let Args { dot, no_splits, path } = Args::parse();

    let text = match std::fs::read_to_string(&path) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("Error: failed to read '{}': {}", path, e);
            exit(1);
        }
    };

    let settings = BuildSettings {
        insert_splits: !no_splits,
        ..BuildSettings::default()
    };
    let graph = match ConnectedGraph::from_trace(&text, None, settings) {
        Ok(graph) => graph,
        Err(e) => {
            eprintln!("Error: failed to build graph from '{}': {}", path, e);
            exit(1);
        }
    };

    println!("{}", graph);
    println!(
        "{} ordered ops, {} splits, {} sources, {} sinks",
        graph.ordered_ops().len(),
        graph.split_count(),
        get_all_input_ops(&graph).len(),
        get_all_output_ops(&graph).len()
    );

    if let Some(dot) = dot {
        let result = File::create(&dot).and_then(|file| graph_to_dot(BufWriter::new(file), &graph));
        if let Err(e) = result {
            eprintln!("Error: failed to write '{}': {}", dot, e);
            exit(1);
        }
        println!("Wrote dot file to '{}'", dot);
    }
}
