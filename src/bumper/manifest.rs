use crate::bump::ReleaseRequest;
use crate::bumper::{BumpOutcome, VersionBumper};
use crate::error::{ReleaseError, Result};
use crate::git::Vcs;
use semver::Version;
use serde_json::Value;
use std::fs;
use std::path::PathBuf;
use tracing::info;

/// Bumps the `version` field of a `package.json`-style manifest directly
///
/// Produces the same commit and tag shape as `npm version`: the message
/// defaults to the bare version and the tag is annotated with the message.
pub struct ManifestBump<'a> {
    vcs: &'a dyn Vcs,
    manifest: PathBuf,
    tag_prefix: String,
}

impl<'a> ManifestBump<'a> {
    pub fn new(vcs: &'a dyn Vcs, manifest: impl Into<PathBuf>) -> Self {
        ManifestBump {
            vcs,
            manifest: manifest.into(),
            tag_prefix: "v".to_string(),
        }
    }

    pub fn tag_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.tag_prefix = prefix.into();
        self
    }

    fn read_manifest(&self) -> Result<(Value, Version)> {
        let contents = fs::read_to_string(&self.manifest).map_err(|e| {
            ReleaseError::manifest(format!("Cannot read {}: {}", self.manifest.display(), e))
        })?;
        let document: Value = serde_json::from_str(&contents)?;

        let current = document
            .get("version")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                ReleaseError::manifest(format!(
                    "{} has no string \"version\" field",
                    self.manifest.display()
                ))
            })?;
        let version = Version::parse(current).map_err(|e| {
            ReleaseError::manifest(format!("Invalid version '{}': {}", current, e))
        })?;

        Ok((document, version))
    }

    fn write_manifest(&self, mut document: Value, version: &Version) -> Result<()> {
        if let Some(fields) = document.as_object_mut() {
            fields.insert("version".to_string(), Value::String(version.to_string()));
        }
        let mut contents = serde_json::to_string_pretty(&document)?;
        contents.push('\n');
        fs::write(&self.manifest, contents)?;
        Ok(())
    }
}

impl VersionBumper for ManifestBump<'_> {
    fn bump(&self, request: &ReleaseRequest, message: Option<&str>) -> Result<BumpOutcome> {
        let (document, current) = self.read_manifest()?;
        let next = request.bump_kind().apply(&current, request.pre_id())?;
        let tag = format!("{}{}", self.tag_prefix, next);

        if self.vcs.tag_target(&tag)?.is_some() {
            return Err(ReleaseError::tag(format!("tag '{}' already exists", tag)));
        }

        self.write_manifest(document, &next)?;

        let version = next.to_string();
        let message = match message {
            Some(template) => template.replace("{version}", &version),
            None => version.clone(),
        };

        self.vcs.stage_all()?;
        self.vcs.commit(&message)?;
        self.vcs.tag(&tag, Some(&message), false)?;

        info!(from = %current, to = %next, %tag, "bumped manifest version");
        Ok(BumpOutcome { version: next, tag })
    }
}
