//! Submitted form to command-line translation.
//!
//! Every submitted key is decoded back into a [`FieldId`]. Fields are sorted by
//! `(command_index, param_index)` so that each command's arguments come out in
//! declaration order, then translated one command at a time.

use std::path::Path;

use crate::bridge::artifacts::{Artifact, ArtifactRole, RequestWorkspace, Upload};
use crate::bridge::field_id::{FieldId, ValueType};
use crate::bridge::tree::{CommandChain, ParamKind};
use crate::{Error, Result};

/// The raw content of one form submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmittedForm {
    /// Text values in submission order; a key may appear more than once
    pub values: Vec<(String, String)>,
    pub uploads: Vec<Upload>,
}

impl SubmittedForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.push((key.into(), value.into()));
        self
    }

    pub fn with_upload(mut self, upload: Upload) -> Self {
        self.uploads.push(upload);
        self
    }

    /// Every value submitted under `key`, in order.
    pub fn values_for(&self, key: &str) -> Vec<String> {
        self.values
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
            .collect()
    }

    pub fn upload_for(&self, key: &str) -> Option<&Upload> {
        self.uploads.iter().find(|u| u.field == key)
    }

    /// Distinct keys, text fields first, in submission order.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = Vec::new();
        let all = self
            .values
            .iter()
            .map(|(k, _)| k.as_str())
            .chain(self.uploads.iter().map(|u| u.field.as_str()));
        for key in all {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        keys
    }
}

/// A downloadable result of an execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub link_name: String,
    pub url: String,
}

/// One submitted field with its values and, for path-typed fields, its artifact.
#[derive(Debug)]
pub struct FieldInfo {
    pub id: FieldId,
    pub values: Vec<String>,
    artifact: Option<Artifact>,
}

impl FieldInfo {
    pub fn new(id: FieldId, form: &SubmittedForm) -> Self {
        let key = id.encode();
        let values = form.values_for(&key);
        let artifact = ArtifactRole::for_value_type(id.value_type)
            .map(|role| Artifact::new(&id, role, &values, form.upload_for(&key).cloned()));
        Self {
            id,
            values,
            artifact,
        }
    }

    /// Runs before the field's tokens are emitted.
    pub fn before_execute(&mut self, workspace: &mut RequestWorkspace) -> Result<()> {
        match &mut self.artifact {
            Some(artifact) => artifact.before_execute(workspace),
            None => Ok(()),
        }
    }

    /// Runs after the process has exited.
    pub fn after_execute(&mut self, workspace: &mut RequestWorkspace) -> Result<()> {
        match &mut self.artifact {
            Some(artifact) => artifact.after_execute(workspace),
            None => Ok(()),
        }
    }

    /// Path given to the process for path-typed fields.
    pub fn path(&self) -> Option<&Path> {
        self.artifact.as_ref().and_then(|a| a.path())
    }

    pub fn is_downloadable(&self) -> bool {
        self.artifact.as_ref().is_some_and(|a| a.is_downloadable())
    }

    pub fn link_name(&self) -> Option<&str> {
        self.artifact.as_ref().and_then(|a| a.link_name())
    }

    fn path_token(&self) -> Option<String> {
        self.path().map(|p| p.to_string_lossy().into_owned())
    }

    fn non_empty_values(&self) -> impl Iterator<Item = &String> {
        self.values.iter().filter(|v| !v.is_empty())
    }

    /// Tokens this field contributes to its command's argv slice.
    pub fn tokens(&self) -> Vec<String> {
        match self.id.param_kind {
            ParamKind::Option | ParamKind::Flag => self.option_tokens(),
            ParamKind::Argument => self.argument_tokens(),
        }
    }

    fn option_tokens(&self) -> Vec<String> {
        if self.id.value_type.is_artifact() {
            return match self.path_token() {
                Some(path) => vec![self.id.cli_name.clone(), path],
                None => Vec::new(),
            };
        }

        if self.id.value_type == ValueType::BoolFlag {
            // A checked box posts the hidden "off" value and then the "on" value.
            let on = &self.id.cli_name;
            if self.values.iter().any(|v| v == on) {
                return vec![on.clone()];
            }
            return self.non_empty_values().last().cloned().into_iter().collect();
        }

        let values: Vec<String> = self.non_empty_values().cloned().collect();
        if values.is_empty() {
            return Vec::new();
        }
        let mut tokens = vec![self.id.cli_name.clone()];
        tokens.extend(values);
        tokens
    }

    fn argument_tokens(&self) -> Vec<String> {
        if self.id.value_type.is_artifact() {
            return self.path_token().into_iter().collect();
        }
        if self.non_empty_values().next().is_none() {
            return Vec::new();
        }
        if self.id.arity.is_variadic() {
            // One textarea line per positional value.
            let split: Vec<String> = self
                .values
                .iter()
                .flat_map(|v| v.lines().map(str::to_string))
                .collect();
            tracing::debug!(field = %self.id.cli_name, values = ?split, "split variadic argument");
            split
        } else {
            self.values.clone()
        }
    }
}

/// Translates one submission into per-command argument slices.
#[derive(Debug)]
pub struct RequestToArgs {
    field_infos: Vec<FieldInfo>,
    workspace: RequestWorkspace,
}

impl RequestToArgs {
    /// Decode every submitted key. Any key that is not a field identifier
    /// rejects the whole submission.
    pub fn new(form: &SubmittedForm, workspace: RequestWorkspace) -> Result<Self> {
        let mut field_infos = form
            .keys()
            .into_iter()
            .map(|key| FieldId::decode(key).map(|id| FieldInfo::new(id, form)))
            .collect::<Result<Vec<_>>>()?;
        field_infos.sort_by_key(|fi| fi.id.order());
        Ok(Self {
            field_infos,
            workspace,
        })
    }

    /// Reject flag fields that do not name a declared flag, or that carry a
    /// value other than its on or off literal.
    pub fn check_flags(&self, chain: &CommandChain<'_>) -> Result<()> {
        let levels: Vec<_> = chain.levels().collect();
        let flags = self
            .field_infos
            .iter()
            .filter(|fi| fi.id.value_type == ValueType::BoolFlag);
        for fi in flags {
            let param = levels
                .get(fi.id.command_index)
                .and_then(|level| level.node.params().get(fi.id.param_index))
                .filter(|p| p.kind == ParamKind::Flag && p.cli_name() == fi.id.cli_name)
                .ok_or_else(|| Error::MalformedField(format!("no such flag: {}", fi.id)))?;
            let off = param.off_literal.as_deref();
            let unexpected = fi
                .values
                .iter()
                .find(|v| !v.is_empty() && **v != fi.id.cli_name && Some(v.as_str()) != off);
            if let Some(value) = unexpected {
                return Err(Error::MalformedField(format!(
                    "unexpected value '{}' for flag {}",
                    value, fi.id.cli_name
                )));
            }
        }
        Ok(())
    }

    /// Fields in command-line order.
    pub fn field_infos(&self) -> &[FieldInfo] {
        &self.field_infos
    }

    pub fn workspace(&self) -> &RequestWorkspace {
        &self.workspace
    }

    /// Arguments for the command at `command_index`, running each field's
    /// pre-execution hook first.
    pub fn command_args(&mut self, command_index: usize) -> Result<Vec<String>> {
        let Self {
            field_infos,
            workspace,
        } = self;

        let mut fields: Vec<&mut FieldInfo> = field_infos
            .iter_mut()
            .filter(|fi| fi.id.command_index == command_index)
            .collect();
        fields.sort_by_key(|fi| fi.id.param_index);

        let mut args = Vec::new();
        for fi in fields {
            fi.before_execute(workspace)?;
            args.extend(fi.tokens());
        }
        Ok(args)
    }

    /// The full argv: the program, the root's arguments, then each further
    /// command name followed by its own arguments.
    pub fn build_argv(&mut self, program: &str, command_names: &[&str]) -> Result<Vec<String>> {
        let mut argv = vec![program.to_string()];
        argv.extend(self.command_args(0)?);
        for (i, name) in command_names.iter().enumerate().skip(1) {
            argv.push(name.to_string());
            argv.extend(self.command_args(i)?);
        }
        Ok(argv)
    }

    /// Run every post-execution hook in command-line order.
    pub fn after_execution(&mut self) -> Result<()> {
        for fi in &mut self.field_infos {
            fi.after_execute(&mut self.workspace)?;
        }
        Ok(())
    }

    /// Downloadable artifacts with their URLs.
    pub fn downloads(&self) -> Vec<Download> {
        self.field_infos
            .iter()
            .filter(|fi| fi.is_downloadable())
            .filter_map(|fi| {
                let link_name = fi.link_name()?.to_string();
                let url = self.workspace.download_url(fi.path()?)?;
                Some(Download { link_name, url })
            })
            .collect()
    }
}
