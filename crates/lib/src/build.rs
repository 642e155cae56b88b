//! Memoized build steps that produce package contents.
//!
//! A build plan is a set of [`BuildPackage`]s with dependencies between them.
//! [`BuildGraph`] orders them, and [`BuildRunner`] runs each package's shell
//! commands unless an identical build already left its output behind.
//!
//! A package's memo key covers its name, commands, environment, the content of
//! every input file or directory, and the memo keys of its dependencies, so a
//! change anywhere upstream rebuilds everything downstream.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info};

use crate::locations::{self, LocationError};
use crate::util::fs::{remove_dir_if_exists, remove_file_if_exists, write_atomic};
use crate::util::hash::{HashError, hash_directory, hash_file};

#[derive(Debug, Error)]
pub enum BuildError {
  #[error("failed to read build plan '{path}': {source}")]
  ReadPlan {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("invalid build plan '{path}': {source}")]
  ParsePlan {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("build package '{0}' is defined more than once")]
  DuplicatePackage(String),

  #[error("build package '{package}' depends on unknown package '{dependency}'")]
  UnknownDependency { package: String, dependency: String },

  #[error("dependency cycle detected in build plan")]
  CycleDetected,

  #[error("input '{path}' of build package '{package}' does not exist")]
  MissingInput { package: String, path: PathBuf },

  #[error(transparent)]
  Hash(#[from] HashError),

  #[error(transparent)]
  Location(#[from] LocationError),

  #[error("I/O error at '{path}': {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("build package '{package}' failed running `{cmd}` (exit code {code:?})")]
  CommandFailed {
    package: String,
    cmd: String,
    code: Option<i32>,
  },
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> BuildError + '_ {
  move |source| BuildError::Io {
    path: path.to_path_buf(),
    source,
  }
}

/// One buildable package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildPackage {
  pub name: String,
  #[serde(default)]
  pub dependencies: Vec<String>,
  /// Files or directories whose content feeds the memo key.
  #[serde(default)]
  pub inputs: Vec<PathBuf>,
  pub commands: Vec<String>,
  #[serde(default)]
  pub env: BTreeMap<String, String>,
}

/// The JSON form of a build plan: `{ "packages": [ ... ] }`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildPlan {
  pub packages: Vec<BuildPackage>,
}

impl BuildPlan {
  /// Load a plan, resolving relative inputs against the plan's directory.
  pub fn load(path: &Path) -> Result<Self, BuildError> {
    let content = fs::read_to_string(path).map_err(|source| BuildError::ReadPlan {
      path: path.to_path_buf(),
      source,
    })?;
    let mut plan: BuildPlan = serde_json::from_str(&content).map_err(|source| BuildError::ParsePlan {
      path: path.to_path_buf(),
      source,
    })?;

    let base = path.parent().unwrap_or(Path::new(""));
    for package in &mut plan.packages {
      for input in &mut package.inputs {
        if input.is_relative() {
          *input = base.join(&*input);
        }
      }
    }
    Ok(plan)
  }
}

/// Build packages with edges from each dependency to its dependents.
#[derive(Debug)]
pub struct BuildGraph {
  graph: DiGraph<String, ()>,
  packages: BTreeMap<String, BuildPackage>,
  nodes: HashMap<String, NodeIndex>,
}

impl BuildGraph {
  pub fn new(packages: impl IntoIterator<Item = BuildPackage>) -> Result<Self, BuildError> {
    let mut graph = DiGraph::new();
    let mut nodes = HashMap::new();
    let mut by_name = BTreeMap::new();

    for package in packages {
      // Names become directories under the work dir that get wiped on rebuild.
      locations::validate_component("build package", &package.name)?;
      if by_name.contains_key(&package.name) {
        return Err(BuildError::DuplicatePackage(package.name));
      }
      nodes.insert(package.name.clone(), graph.add_node(package.name.clone()));
      by_name.insert(package.name.clone(), package);
    }

    for package in by_name.values() {
      let dependent = nodes[&package.name];
      for dependency in &package.dependencies {
        let Some(&dep) = nodes.get(dependency) else {
          return Err(BuildError::UnknownDependency {
            package: package.name.clone(),
            dependency: dependency.clone(),
          });
        };
        graph.add_edge(dep, dependent, ());
      }
    }

    toposort(&graph, None).map_err(|_| BuildError::CycleDetected)?;

    Ok(Self {
      graph,
      packages: by_name,
      nodes,
    })
  }

  pub fn get(&self, name: &str) -> Option<&BuildPackage> {
    self.packages.get(name)
  }

  pub fn len(&self) -> usize {
    self.packages.len()
  }

  pub fn is_empty(&self) -> bool {
    self.packages.is_empty()
  }

  /// Package names with dependencies first; ties break by name.
  pub fn order(&self) -> Vec<&str> {
    let mut in_degree: HashMap<NodeIndex, usize> = self
      .graph
      .node_indices()
      .map(|idx| (idx, self.graph.neighbors_directed(idx, Direction::Incoming).count()))
      .collect();

    let mut ready: BTreeSet<&str> = in_degree
      .iter()
      .filter(|(_, degree)| **degree == 0)
      .map(|(idx, _)| self.graph[*idx].as_str())
      .collect();

    let mut order = Vec::with_capacity(self.packages.len());
    while let Some(name) = ready.pop_first() {
      order.push(name);
      for next in self.graph.neighbors_directed(self.nodes[name], Direction::Outgoing) {
        if let Some(degree) = in_degree.get_mut(&next) {
          *degree -= 1;
          if *degree == 0 {
            ready.insert(self.graph[next].as_str());
          }
        }
      }
    }
    order
  }
}

/// What a run did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildReport {
  pub ran: Vec<String>,
  pub cached: Vec<String>,
}

/// Runs a [`BuildGraph`] inside a work directory.
///
/// Layout: `<work>/output/<name>/` holds each package's output, and
/// `<work>/memo/<name>.hash` the memo key of the build that produced it.
#[derive(Debug, Clone)]
pub struct BuildRunner {
  work_dir: PathBuf,
}

impl BuildRunner {
  pub fn new(work_dir: impl Into<PathBuf>) -> Self {
    Self {
      work_dir: work_dir.into(),
    }
  }

  pub fn output_dir(&self, name: &str) -> PathBuf {
    self.work_dir.join("output").join(name)
  }

  fn memo_file(&self, name: &str) -> PathBuf {
    self.work_dir.join("memo").join(format!("{}.hash", name))
  }

  pub fn run(&self, graph: &BuildGraph) -> Result<BuildReport, BuildError> {
    let mut keys: HashMap<&str, String> = HashMap::new();
    let mut report = BuildReport::default();

    for name in graph.order() {
      let Some(package) = graph.get(name) else {
        continue;
      };
      let key = memo_key(package, &keys)?;
      let output = self.output_dir(name);
      let memo = self.memo_file(name);

      let previous = fs::read_to_string(&memo).ok();
      if previous.as_deref().map(str::trim) == Some(key.as_str()) && output.is_dir() {
        debug!(package = name, "build cached");
        report.cached.push(name.to_string());
      } else {
        // Drop the memo first so a failed build never looks finished.
        remove_file_if_exists(&memo).map_err(io_err(&memo))?;
        remove_dir_if_exists(&output).map_err(io_err(&output))?;
        fs::create_dir_all(&output).map_err(io_err(&output))?;

        for cmd in &package.commands {
          run_command(package, cmd, &output)?;
        }

        write_atomic(&memo, key.as_bytes()).map_err(io_err(&memo))?;
        info!(package = name, "built");
        report.ran.push(name.to_string());
      }
      keys.insert(name, key);
    }

    Ok(report)
  }
}

/// Memo key of `package`, given the keys of already-visited dependencies.
fn memo_key(package: &BuildPackage, dep_keys: &HashMap<&str, String>) -> Result<String, BuildError> {
  let mut hasher = Sha256::new();
  let mut field = |tag: &str, value: &[u8]| {
    hasher.update(tag.as_bytes());
    hasher.update((value.len() as u64).to_le_bytes());
    hasher.update(value);
  };

  field("name", package.name.as_bytes());
  for cmd in &package.commands {
    field("cmd", cmd.as_bytes());
  }
  for (key, value) in &package.env {
    field("env", format!("{}={}", key, value).as_bytes());
  }
  for input in &package.inputs {
    let hash = if input.is_dir() {
      hash_directory(input)?
    } else if input.is_file() {
      hash_file(input)?
    } else {
      return Err(BuildError::MissingInput {
        package: package.name.clone(),
        path: input.clone(),
      });
    };
    field("input", hash.as_bytes());
  }

  let mut dependencies: Vec<&String> = package.dependencies.iter().collect();
  dependencies.sort();
  for dependency in dependencies {
    let key = dep_keys.get(dependency.as_str()).map(String::as_str).unwrap_or_default();
    field("dep", format!("{}:{}", dependency, key).as_bytes());
  }

  Ok(hex::encode(hasher.finalize()))
}

#[cfg(windows)]
fn shell() -> (&'static str, &'static str) {
  ("cmd.exe", "/C")
}

#[cfg(not(windows))]
fn shell() -> (&'static str, &'static str) {
  ("/bin/sh", "-c")
}

fn run_command(package: &BuildPackage, cmd: &str, out_dir: &Path) -> Result<(), BuildError> {
  info!(package = %package.name, cmd = %cmd, "executing command");

  let (shell, flag) = shell();
  let output = Command::new(shell)
    .arg(flag)
    .arg(cmd)
    .current_dir(out_dir)
    .env("out", out_dir)
    .env("SOURCE_DATE_EPOCH", "315532800")
    .envs(&package.env)
    .output()
    .map_err(io_err(out_dir))?;

  if !output.status.success() {
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.is_empty() {
      debug!(stderr = %stderr, "command stderr");
    }
    return Err(BuildError::CommandFailed {
      package: package.name.clone(),
      cmd: cmd.to_string(),
      code: output.status.code(),
    });
  }

  let stdout = String::from_utf8_lossy(&output.stdout);
  if !stdout.trim().is_empty() {
    debug!(stdout = %stdout.trim(), "command output");
  }
  Ok(())
}
