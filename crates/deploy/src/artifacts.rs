//! Compiled contract artifacts.
//!
//! Reads the Hardhat build output (`hh-sol-artifact-1` files under `<root>/contracts`)
//! and turns typed constructor arguments into deployment init code. The build-info file
//! referenced by each artifact's `.dbg.json` provides the compiler input needed for
//! explorer verification.

use std::path::{Path, PathBuf};

use alloy_core::dyn_abi::{DynSolType, DynSolValue, Specifier};
use alloy_core::json_abi::JsonAbi;
use alloy_core::primitives::Bytes;
use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::plan::{ArtifactKind, ConstructorArg};

/// Default location of the Hardhat build output.
pub const DEFAULT_ARTIFACTS_DIR: &str = "artifacts";

/// Constructor arguments that do not fit the artifact's ABI.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgumentError {
    #[error("{contract} expects {expected} constructor arguments, got {actual}")]
    Count {
        contract: String,
        expected: usize,
        actual: usize,
    },

    #[error("constructor argument {index} of {contract} must be {expected}, got {actual}")]
    Type {
        contract: String,
        index: usize,
        expected: String,
        actual: String,
    },

    #[error("constructor argument {index} of {contract} is an unresolved placeholder")]
    Unresolved { contract: String, index: usize },

    #[error("{contract} has an unsupported constructor type: {message}")]
    UnsupportedType { contract: String, message: String },
}

/// Compiler input and version for one compilation, as written by Hardhat.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildInfo {
    pub solc_long_version: String,
    /// Standard JSON compiler input.
    pub input: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DebugFile {
    build_info: String,
}

/// A compiled contract.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub contract_name: String,
    pub source_name: String,
    pub abi: JsonAbi,
    pub bytecode: Bytes,
    #[serde(skip)]
    path: PathBuf,
}

impl Artifact {
    /// Load an artifact file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read artifact {}", path.display()))?;
        let mut artifact: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse artifact {}", path.display()))?;

        if artifact.bytecode.is_empty() {
            anyhow::bail!(
                "Artifact {} has no bytecode (abstract contract or interface?)",
                artifact.contract_name
            );
        }

        artifact.path = path.to_path_buf();
        Ok(artifact)
    }

    /// `<sourceName>:<contractName>`, the form explorers expect.
    pub fn fully_qualified_name(&self) -> String {
        format!("{}:{}", self.source_name, self.contract_name)
    }

    /// ABI-encode resolved constructor arguments against the artifact's constructor.
    pub fn encode_constructor_args(&self, args: &[ConstructorArg]) -> Result<Bytes, ArgumentError> {
        let inputs = self
            .abi
            .constructor()
            .map(|ctor| ctor.inputs.as_slice())
            .unwrap_or_default();

        if inputs.len() != args.len() {
            return Err(ArgumentError::Count {
                contract: self.contract_name.clone(),
                expected: inputs.len(),
                actual: args.len(),
            });
        }

        let values = inputs
            .iter()
            .zip(args)
            .enumerate()
            .map(|(index, (param, arg))| {
                let ty = param.resolve().map_err(|e| ArgumentError::UnsupportedType {
                    contract: self.contract_name.clone(),
                    message: e.to_string(),
                })?;
                self.coerce(index, &ty, arg)
            })
            .collect::<Result<Vec<_>, _>>()?;

        if values.is_empty() {
            return Ok(Bytes::new());
        }

        Ok(DynSolValue::Tuple(values).abi_encode_params().into())
    }

    /// Init code for a deployment: bytecode followed by the encoded constructor arguments.
    pub fn deploy_data(&self, args: &[ConstructorArg]) -> Result<Bytes, ArgumentError> {
        let encoded = self.encode_constructor_args(args)?;
        let mut data = Vec::with_capacity(self.bytecode.len() + encoded.len());
        data.extend_from_slice(&self.bytecode);
        data.extend_from_slice(&encoded);
        Ok(data.into())
    }

    fn coerce(
        &self,
        index: usize,
        ty: &DynSolType,
        arg: &ConstructorArg,
    ) -> Result<DynSolValue, ArgumentError> {
        let mismatch = || ArgumentError::Type {
            contract: self.contract_name.clone(),
            index,
            expected: ty.sol_type_name().into_owned(),
            actual: arg.to_string(),
        };

        match (ty, arg) {
            (_, ConstructorArg::StepAddress(_)) => Err(ArgumentError::Unresolved {
                contract: self.contract_name.clone(),
                index,
            }),
            (DynSolType::Address, ConstructorArg::Address(address)) => {
                Ok(DynSolValue::Address(*address))
            }
            (DynSolType::String, ConstructorArg::String(value)) => {
                Ok(DynSolValue::String(value.clone()))
            }
            (DynSolType::Uint(bits), ConstructorArg::Uint(value)) if value.bit_len() <= *bits => {
                Ok(DynSolValue::Uint(*value, *bits))
            }
            _ => Err(mismatch()),
        }
    }

    /// Load the build-info this artifact was compiled in.
    pub fn load_build_info(&self) -> Result<BuildInfo> {
        let dbg_path = self.path.with_extension("dbg.json");
        let content = std::fs::read_to_string(&dbg_path)
            .with_context(|| format!("Failed to read {}", dbg_path.display()))?;
        let dbg: DebugFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", dbg_path.display()))?;

        let parent = dbg_path
            .parent()
            .context("Artifact path must have a parent directory")?;
        let build_info_path = parent.join(&dbg.build_info);

        let content = std::fs::read_to_string(&build_info_path)
            .with_context(|| format!("Failed to read build info {}", build_info_path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse build info {}", build_info_path.display()))
    }
}

/// Locates artifacts in a Hardhat artifacts directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Load the artifact for `kind`.
    pub fn load(&self, kind: ArtifactKind) -> Result<Artifact> {
        let file_name = format!("{}.json", kind.contract_name());
        let contracts_dir = self.root.join("contracts");

        let path = find_file(&contracts_dir, &file_name)?.with_context(|| {
            format!(
                "Artifact {} not found under {}. Did you compile the contracts?",
                file_name,
                contracts_dir.display()
            )
        })?;

        tracing::debug!(kind = %kind, path = %path.display(), "Loading artifact");
        Artifact::load_from_file(&path)
    }
}

/// Depth-first search for a file name below `dir`.
fn find_file(dir: &Path, file_name: &str) -> Result<Option<PathBuf>> {
    let mut pending = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        let entries = std::fs::read_dir(&current)
            .with_context(|| format!("Failed to read directory {}", current.display()))?;

        for entry in entries {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else if path.file_name().is_some_and(|name| name == file_name) {
                return Ok(Some(path));
            }
        }
    }

    Ok(None)
}
