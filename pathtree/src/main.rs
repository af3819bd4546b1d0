mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use output::{CatOutput, EntryInfo, LsOutput, ManifestOutput, OutputWriter, RootsOutput};
use pathtree_core::{
    ManifestAttributes, PathList, PathTree, PathTreeBuilder, PathVisit, of_roots,
};
use std::fmt::Write as _;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// PathTree - inspect directories, jars and zips as uniform resource trees
#[derive(Parser)]
#[command(name = "pathtree")]
#[command(about = "Inspect directories and jar/zip archives as resource trees", long_about = None)]
#[command(version)]
struct Cli {
    /// Emit JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by commands that build a tree over one root.
#[derive(clap::Args)]
struct TreeArgs {
    /// Directory, archive or file to inspect
    path: PathBuf,

    /// Only show entries matching this glob (repeatable)
    #[arg(long = "include", value_name = "GLOB")]
    includes: Vec<String>,

    /// Hide entries matching this glob (repeatable)
    #[arg(long = "exclude", value_name = "GLOB")]
    excludes: Vec<String>,

    /// Platform release used to resolve multi-release overrides
    #[arg(long)]
    release: Option<u32>,

    /// Read META-INF/MANIFEST.MF of directory roots
    #[arg(long)]
    manifest: bool,
}

impl TreeArgs {
    fn build(&self) -> Result<Arc<dyn PathTree>> {
        let mut builder = PathTreeBuilder::new()
            .root(&self.path)
            .includes(&self.includes)
            .excludes(&self.excludes)
            .manifest_enabled(self.manifest);
        if let Some(release) = self.release {
            builder = builder.release(release);
        }
        builder
            .build()
            .with_context(|| format!("Failed to open {}", self.path.display()))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List the entries of a tree in walk order
    Ls {
        #[command(flatten)]
        tree: TreeArgs,

        /// Show the URL of every entry
        #[arg(long)]
        urls: bool,
    },

    /// Output the content of one entry to stdout
    Cat {
        #[command(flatten)]
        tree: TreeArgs,

        /// Entry path relative to the tree root
        relative: String,
    },

    /// Show the manifest attributes of a tree
    Manifest {
        #[command(flatten)]
        tree: TreeArgs,
    },

    /// Show the filesystem roots behind a union of paths
    Roots {
        /// Directories or archives, in lookup order
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
}

fn main() -> ExitCode {
    set_up_logging();
    let cli = Cli::parse();
    let output = OutputWriter::new(cli.json);

    let result = match cli.command {
        Commands::Ls { tree, urls } => cmd_ls(&output, &tree, urls),
        Commands::Cat { tree, relative } => cmd_cat(&output, &tree, &relative),
        Commands::Manifest { tree } => cmd_manifest(&output, &tree),
        Commands::Roots { paths } => cmd_roots(&output, paths),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            output.write_error(&err, 1);
            ExitCode::FAILURE
        }
    }
}

/// Log to stderr, filtered by `RUST_LOG`. Nothing is logged when it is unset.
fn set_up_logging() {
    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_ansi(std::io::stderr().is_terminal() && std::env::var_os("NO_COLOR").is_none())
        .with_writer(std::io::stderr)
        .compact();

    tracing_subscriber::registry()
        .with(EnvFilter::builder().from_env_lossy())
        .with(fmt_layer)
        .init();
}

fn display_roots(tree: &dyn PathTree) -> Vec<String> {
    tree.roots()
        .iter()
        .map(|root| root.display().to_string())
        .collect()
}

fn cmd_ls(output: &OutputWriter, args: &TreeArgs, urls: bool) -> Result<()> {
    let tree = args.build()?;
    // Keep archives mounted for the whole listing
    let open = tree
        .open()
        .with_context(|| format!("Failed to open {}", args.path.display()))?;

    let mut entries = Vec::new();
    let mut url_err = None;
    open.walk(&mut |visit: &PathVisit| {
        let url = if urls {
            match visit.url() {
                Ok(url) => Some(url.to_string()),
                Err(err) => {
                    url_err.get_or_insert(err);
                    visit.stop_walking();
                    None
                }
            }
        } else {
            None
        };
        entries.push(EntryInfo {
            relative: visit.relative_path().to_string(),
            path: visit.path().to_string(),
            url,
        });
    })
    .with_context(|| format!("Failed to walk {}", args.path.display()))?;
    open.close()?;
    if let Some(err) = url_err {
        return Err(err).context("Failed to compute entry URL");
    }

    let data = LsOutput {
        success: true,
        result_code: 0,
        roots: display_roots(tree.as_ref()),
        entries,
    };
    output.write(&data, || {
        let mut text = String::new();
        for entry in &data.entries {
            let name = if entry.relative.is_empty() {
                "."
            } else {
                entry.relative.as_str()
            };
            match &entry.url {
                Some(url) => writeln!(text, "{}\t{}", name, url).ok(),
                None => writeln!(text, "{}", name).ok(),
            };
        }
        text
    })
}

fn cmd_cat(output: &OutputWriter, args: &TreeArgs, relative: &str) -> Result<()> {
    let tree = args.build()?;
    let open = tree
        .open()
        .with_context(|| format!("Failed to open {}", args.path.display()))?;

    let path = open
        .get_path(relative)
        .with_context(|| format!("Failed to resolve {}", relative))?
        .with_context(|| format!("{} not found in {}", relative, args.path.display()))?;
    if path.is_dir() {
        anyhow::bail!("{} is a directory", relative);
    }
    let content = path
        .read()
        .with_context(|| format!("Failed to read {}", path))?;
    open.close()?;

    if output.is_json() {
        output.write(
            &CatOutput {
                success: true,
                result_code: 0,
                relative: relative.to_string(),
                path: path.to_string(),
                size: content.len(),
                content: String::from_utf8_lossy(&content).into_owned(),
            },
            String::new,
        )
    } else {
        output.write_raw(&content)
    }
}

fn manifest_text(root: &Path, attributes: Option<&ManifestAttributes>) -> String {
    let Some(attributes) = attributes else {
        return format!("No manifest in {}\n", root.display());
    };
    let headers = [
        ("Specification-Title", &attributes.specification_title),
        ("Specification-Version", &attributes.specification_version),
        ("Specification-Vendor", &attributes.specification_vendor),
        ("Implementation-Title", &attributes.implementation_title),
        ("Implementation-Version", &attributes.implementation_version),
        ("Implementation-Vendor", &attributes.implementation_vendor),
    ];
    let mut text = String::new();
    for (name, value) in headers {
        if let Some(value) = value {
            let _ = writeln!(text, "{}: {}", name, value);
        }
    }
    let _ = writeln!(text, "Multi-Release: {}", attributes.multi_release);
    text
}

fn cmd_manifest(output: &OutputWriter, args: &TreeArgs) -> Result<()> {
    let tree = args.build()?;
    let manifest = tree
        .manifest_attributes()
        .with_context(|| format!("Failed to read manifest of {}", args.path.display()))?;

    let data = ManifestOutput {
        success: true,
        result_code: 0,
        root: args.path.display().to_string(),
        manifest,
    };
    output.write(&data, || manifest_text(&args.path, data.manifest.as_ref()))
}

fn cmd_roots(output: &OutputWriter, paths: Vec<PathBuf>) -> Result<()> {
    let list = PathList::of(paths);
    let tree = of_roots(&list).context("Failed to build tree over roots")?;

    let data = RootsOutput {
        success: true,
        result_code: 0,
        roots: display_roots(tree.as_ref()),
        archive: tree.is_archive_or_origin(),
    };
    output.write(&data, || {
        let mut text = String::new();
        for root in &data.roots {
            let _ = writeln!(text, "{}", root);
        }
        text
    })
}
