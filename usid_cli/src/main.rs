/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use clap::Subcommand;
use serde_json::Value;
use tracing_subscriber::EnvFilter;
use usid::AxisGroup;
use usid::MemoryStore;
use usid::Reduction;
use usid::Selector;
use usid::UsiDataset;
use usid::request;

/// Inspect and slice a dataset held in a JSON store file.
/// ```
///   usid scan.json info
///   usid scan.json slice --select X=3 --select Bias=0:4 --ndim
///   echo '[{"op": "toggle_sorting"}, {"op": "labels"}]' | usid scan.json query -
/// ```
#[derive(Parser, Debug)]
#[command(version)]
struct Args {
    /// The JSON store file
    store: PathBuf,

    /// Path of the main dataset inside the store
    #[arg(long, default_value = "Raw_Measurement/source_main")]
    main: String,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Describe the dataset and its dimensions
    Info,
    /// List the N-dimensional labels
    Labels {
        /// Fastest changing dimension first
        #[arg(long)]
        sorted: bool,
    },
    /// Physical values of one dimension
    Values {
        name: String,
        /// Axis group of the dimension; looked up by name when omitted
        #[arg(long)]
        axis: Option<AxisGroup>,
    },
    /// Read a selection
    Slice {
        /// Selector for one dimension, as NAME=SELECTOR (3, -1, 1:5:2, 0,2,4)
        #[arg(long = "select", value_parser = parse_select)]
        select: Vec<(String, Selector)>,
        /// Reshape to N dimensions
        #[arg(long)]
        ndim: bool,
        /// Defer the read, then compute it in chunks
        #[arg(long)]
        lazy: bool,
    },
    /// The whole dataset in N-dimensional form
    NDim {
        #[arg(long)]
        lazy: bool,
    },
    /// Collapse dimensions of the N-dimensional form
    Reduce {
        #[arg(required = true)]
        dims: Vec<String>,
        #[arg(long, default_value = "mean")]
        reduction: Reduction,
    },
    /// Run JSON requests from a file, or stdin with "-"
    Query { input: String },
}

fn parse_select(arg: &str) -> Result<(String, Selector), String> {
    let (name, selector) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=SELECTOR, got {:?}", arg))?;
    let selector = selector.parse::<Selector>().map_err(|err| err.to_string())?;
    Ok((name.trim().to_string(), selector))
}

/// Builds the request for a command line invocation.
fn to_request(dataset: &UsiDataset, command: Command) -> Result<Value> {
    let request = match command {
        Command::Info => serde_json::json!({"op": "info"}),
        Command::Labels { sorted } => serde_json::json!({"op": "labels", "sorted": sorted}),
        Command::Values { name, axis } => {
            let axis = match axis {
                Some(axis) => axis,
                None => dataset.registry().resolve(&name)?.group,
            };
            serde_json::json!({"op": "values", "axis": axis, "name": name})
        }
        Command::Slice { select, ndim, lazy } => {
            let select: serde_json::Map<String, Value> = select
                .into_iter()
                .map(|(name, selector)| (name, Value::String(selector.to_string())))
                .collect();
            serde_json::json!({"op": "slice", "select": select, "ndim": ndim, "lazy": lazy})
        }
        Command::NDim { lazy } => serde_json::json!({"op": "n_dim", "lazy": lazy}),
        Command::Reduce { dims, reduction } => {
            serde_json::json!({"op": "reduce", "dims": dims, "reduction": reduction})
        }
        Command::Query { .. } => anyhow::bail!("queries carry their own requests"),
    };
    Ok(request)
}

fn read_query(input: &str) -> Result<Vec<Value>> {
    let text = if input == "-" {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text)?;
        text
    } else {
        std::fs::read_to_string(input).with_context(|| format!("reading {}", input))?
    };
    match serde_json::from_str(&text)? {
        Value::Array(requests) => Ok(requests),
        request => Ok(vec![request]),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!(err))?;

    let store = MemoryStore::from_json_path(&args.store)
        .with_context(|| format!("loading store {}", args.store.display()))?;
    let mut dataset = UsiDataset::open(Arc::new(store), &args.main)
        .with_context(|| format!("opening dataset {}", args.main))?;
    tracing::debug!(
        "opened {} in {} with shape {:?}",
        args.main,
        args.store.display(),
        dataset.shape()
    );

    let responses: Vec<Value> = match args.command {
        Command::Query { input } => read_query(&input)?
            .into_iter()
            .map(|request| request::respond(&mut dataset, request))
            .collect(),
        command => {
            let request = to_request(&dataset, command)?;
            let request = request::Request::from_json(request)?;
            let response = request::handle(&mut dataset, &request)?;
            vec![serde_json::to_value(response)?]
        }
    };
    for response in responses {
        println!("{}", serde_json::to_string(&response)?);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;
    use usid::Range;

    use super::*;

    #[test]
    fn test_args() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_select() {
        assert_eq!(
            parse_select("X=3"),
            Ok(("X".to_string(), Selector::Index(3)))
        );
        assert_eq!(
            parse_select("Bias=1:5:2"),
            Ok(("Bias".to_string(), Selector::Range(Range::new(1, 5).step(2))))
        );
        assert_eq!(
            parse_select("Cycle=0,1"),
            Ok(("Cycle".to_string(), Selector::List(vec![0, 1])))
        );
        assert!(parse_select("X").is_err());
        assert!(parse_select("X=text").is_err());
    }

    #[test]
    fn test_slice_command() {
        let args = Args::try_parse_from([
            "usid", "scan.json", "slice", "--select", "X=-1", "--select", "Y=0:2", "--ndim",
        ])
        .unwrap();
        let Command::Slice { select, ndim, lazy } = args.command else {
            panic!("expected a slice command");
        };
        assert_eq!(select.len(), 2);
        assert_eq!(select[0], ("X".to_string(), Selector::Index(-1)));
        assert!(ndim);
        assert!(!lazy);
    }
}
