//! Alignment of an image's layer history against a parsed Dockerfile.
//!
//! Textual Dockerfile parsing itself is out of scope — callers bring their
//! own `DockerfileInstruction` list (e.g. from the `dockerfile-parse`
//! ecosystem equivalent); this module only matches that list against an
//! [`Image`]'s layer `created_by` strings.

use crate::error::{Error, Result};
use crate::model::Image;

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DockerfileInstruction {
    pub instruction: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alignment {
    pub layer_index: usize,
    pub instruction: String,
}

/// Strips a single `#(nop) ` prefix (emitted by Docker for instructions that
/// touch no filesystem content) and classifies the remaining text into an
/// `(instruction, command)` pair. An empty `created_by` defaults to
/// `("FROM", "")`, matching the base-image layer convention.
pub fn normalize_layer_command(created_by: &str) -> (String, String) {
    let stripped = created_by
        .strip_prefix("/bin/sh -c #(nop) ")
        .or_else(|| created_by.strip_prefix("#(nop) "))
        .unwrap_or(created_by)
        .trim_start();

    if stripped.is_empty() {
        return ("FROM".to_string(), String::new());
    }

    let (first_token, rest) = stripped.split_once(char::is_whitespace).unwrap_or((stripped, ""));
    let instruction = first_token.to_uppercase();
    let mut command = rest.trim_start().to_string();

    match instruction.as_str() {
        "ADD" | "COPY" => {
            if let Some(idx) = command.find(" in ") {
                command = format!("{} {}", &command[..idx], &command[idx + 4..]);
            }
        }
        "CMD" => {
            if let Some(rest) = command
                .strip_prefix('[')
                .and_then(|s| s.strip_prefix("/bin/sh -c "))
            {
                command = rest.trim_end_matches(']').to_string();
            }
        }
        _ => {}
    }

    if is_known_instruction(&instruction) {
        (instruction, command)
    } else {
        ("RUN".to_string(), stripped.to_string())
    }
}

fn is_known_instruction(instruction: &str) -> bool {
    matches!(
        instruction,
        "FROM"
            | "ADD"
            | "COPY"
            | "WORKDIR"
            | "ENV"
            | "MAINTAINER"
            | "RUN"
            | "LABEL"
            | "ENTRYPOINT"
            | "USER"
            | "ONBUILD"
            | "CMD"
            | "EXPOSE"
            | "VOLUME"
    )
}

/// Returns whether a layer's normalized command matches a Dockerfile
/// instruction's value, per an instruction-specific predicate.
fn values_match(instruction: &str, layer_value: &str, dockerfile_value: &str) -> bool {
    match instruction {
        "FROM" => true,
        "VOLUME" => dockerfile_value.contains(layer_value) || layer_value.contains(dockerfile_value),
        "CMD" | "EXPOSE" => {
            let layer_tokens: std::collections::HashSet<&str> = layer_value.split_whitespace().collect();
            let dockerfile_tokens: std::collections::HashSet<&str> =
                dockerfile_value.split_whitespace().collect();
            layer_tokens.is_subset(&dockerfile_tokens) || dockerfile_tokens.is_subset(&layer_tokens)
        }
        _ => layer_value.trim() == dockerfile_value.trim(),
    }
}

/// Aligns `image`'s non-empty layers to `instructions` (with the leading
/// `FROM` already removed by the caller), matching from the top of both
/// lists downward. Layers left unmatched at the bottom are attributed to the
/// base image and are not an error.
pub fn align_image_to_dockerfile(
    image: &Image,
    instructions: &[DockerfileInstruction],
) -> Result<Vec<Alignment>> {
    let mut alignments = Vec::new();
    let layer_count = image.layers.len();
    let instr_count = instructions.len();
    let paired = layer_count.min(instr_count);

    for i in 0..paired {
        let layer_index = layer_count - 1 - i;
        let instr = &instructions[instr_count - 1 - i];
        let layer = &image.layers[layer_index];
        let created_by = layer.created_by.clone().unwrap_or_default();
        let (layer_instruction, layer_value) = normalize_layer_command(&created_by);

        if layer_instruction != instr.instruction {
            return Err(Error::CannotAlign {
                layer_index,
                created_by,
                instruction: instr.instruction.clone(),
            });
        }

        if !values_match(&instr.instruction, &layer_value, &instr.value) {
            return Err(Error::AlignedCommandMismatch {
                layer_index,
                instruction: instr.instruction.clone(),
                layer_value,
                dockerfile_value: instr.value.clone(),
            });
        }

        alignments.push(Alignment {
            layer_index,
            instruction: instr.instruction.clone(),
        });
    }

    alignments.reverse();
    Ok(alignments)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_nop_prefix_and_classifies_run() {
        let (instr, cmd) = normalize_layer_command("/bin/sh -c #(nop)  WORKDIR /app");
        assert_eq!(instr, "WORKDIR");
        assert_eq!(cmd, "/app");
    }

    #[test]
    fn plain_run_keeps_shell_command() {
        let (instr, cmd) = normalize_layer_command("/bin/sh -c apt-get update");
        assert_eq!(instr, "RUN");
        assert_eq!(cmd, "/bin/sh -c apt-get update");
    }

    #[test]
    fn empty_created_by_defaults_to_from() {
        assert_eq!(normalize_layer_command(""), ("FROM".to_string(), String::new()));
    }

    #[test]
    fn cmd_token_subset_matches_regardless_of_order() {
        assert!(values_match("CMD", "nginx -g daemon off;", "daemon off; -g nginx"));
    }

    #[test]
    fn volume_matches_by_substring() {
        assert!(values_match("VOLUME", "/data", "/data /logs"));
    }
}
