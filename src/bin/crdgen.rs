//! # CRD Generator
//!
//! Prints the CustomResourceDefinition YAML for the operator's resources.
//!
//! ```bash
//! cargo run --bin crdgen > config/crd/crds.yaml
//! cargo run --bin crdgen -- --kind platform | kubectl apply -f -
//! ```

use clap::{Parser, ValueEnum};
use kube::core::CustomResourceExt;
use platform_operator::crd::{DatabaseUser, Platform};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Kind {
    All,
    Databaseuser,
    Platform,
}

#[derive(Debug, Parser)]
#[command(name = "crdgen", about = "Generate CRD YAML")]
struct Args {
    #[arg(long, value_enum, default_value = "all")]
    kind: Kind,
}

fn main() {
    let args = Args::parse();

    let crds = match args.kind {
        Kind::All => vec![DatabaseUser::crd(), Platform::crd()],
        Kind::Databaseuser => vec![DatabaseUser::crd()],
        Kind::Platform => vec![Platform::crd()],
    };

    for crd in crds {
        match serde_yaml::to_string(&crd) {
            Ok(yaml) => {
                println!("---");
                print!("{yaml}");
            }
            Err(e) => {
                eprintln!("Failed to serialize CRD to YAML: {e}");
                std::process::exit(1);
            }
        }
    }
}
