// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Option parsing for triage front-ends.
//!
//! Hand-rolled on purpose: the contract ignores flags it does not know, so a
//! wrapper can extend the surface without the core rejecting its arguments.
//! `--help` surfaces as a distinguished sentinel rather than an error
//! message, letting callers decide how to print usage.

use std::path::PathBuf;

use thiserror::Error;

use crate::options::BuildOptions;

const DEFAULT_MAX_STRING_LENGTH: usize = 65_536;
const DEFAULT_MAX_STACK_FRAMES: usize = 30;
const DEFAULT_TOP_STACK_THREADS: usize = 5;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CliError {
    /// Not a failure: the caller should print usage and exit 0.
    #[error("help requested")]
    HelpRequested,
    #[error("flag {flag} expects a value")]
    MissingValue { flag: String },
    #[error("flag {flag} expects an integer, got \"{value}\"")]
    InvalidValue { flag: String, value: String },
}

/// Parsed front-end options: the dump to open, where to put the JSON report,
/// and the build bounds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliOptions {
    pub dump_path: Option<String>,
    pub json_path: Option<PathBuf>,
    pub build: BuildOptions,
}

impl CliOptions {
    /// Parses program arguments (without the executable name). Unknown
    /// flags are ignored; the first bare argument is the dump path.
    pub fn parse<I, S>(args: I) -> Result<Self, CliError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut options = Self::default();
        let mut iter = args.into_iter();
        while let Some(arg) = iter.next() {
            let arg = arg.as_ref();
            match arg {
                "--help" | "-h" => return Err(CliError::HelpRequested),
                "--strings" | "-s" => {
                    options.build.max_strings_to_capture = count_value(arg, &mut iter)?;
                }
                "--max-string-length" => {
                    options.build.max_string_length =
                        floored_value(arg, &mut iter, DEFAULT_MAX_STRING_LENGTH)?;
                }
                "--heap-strings" => {
                    options.build.heap_string_limit = count_value(arg, &mut iter)?;
                }
                "--heap-histogram" => {
                    options.build.heap_histogram_count = count_value(arg, &mut iter)?;
                }
                "--max-stack-frames" => {
                    options.build.max_stack_frames =
                        floored_value(arg, &mut iter, DEFAULT_MAX_STACK_FRAMES)?;
                }
                "--top-stack-threads" => {
                    options.build.top_stack_threads =
                        floored_value(arg, &mut iter, DEFAULT_TOP_STACK_THREADS)?;
                }
                "--json" => {
                    let value = raw_value(arg, &mut iter)?;
                    options.json_path = Some(PathBuf::from(value));
                }
                _ if arg.starts_with('-') => {
                    // Unknown flag: skipped. Wrapper policy decides whether
                    // to warn the user.
                }
                _ => {
                    if options.dump_path.is_none() {
                        options.dump_path = Some(arg.to_string());
                    }
                }
            }
        }
        Ok(options)
    }
}

/// Usage text for wrappers that surface [`CliError::HelpRequested`].
pub fn usage() -> &'static str {
    "Usage: dump-triage <DUMP_PATH> [options]\n\
     \n\
     Options:\n\
     \x20 -s, --strings <N>            Cap on stack-root strings to capture\n\
     \x20 --max-string-length <N>      Characters kept per string (default 65536)\n\
     \x20 --heap-strings <N>           Cap on additional heap strings\n\
     \x20 --heap-histogram <N>         Top heap types to surface (0 disables)\n\
     \x20 --max-stack-frames <N>       Frames kept per thread (default 30)\n\
     \x20 --top-stack-threads <N>      Threads shown with stacks (default 5)\n\
     \x20 --json <PATH>                Write the {snapshot, findings} JSON report\n\
     \x20 -h, --help                   Show this help\n"
}

fn raw_value<I, S>(flag: &str, iter: &mut I) -> Result<String, CliError>
where
    I: Iterator<Item = S>,
    S: AsRef<str>,
{
    iter.next()
        .map(|v| v.as_ref().to_string())
        .ok_or_else(|| CliError::MissingValue {
            flag: flag.to_string(),
        })
}

fn int_value<I, S>(flag: &str, iter: &mut I) -> Result<i64, CliError>
where
    I: Iterator<Item = S>,
    S: AsRef<str>,
{
    let value = raw_value(flag, iter)?;
    value.parse::<i64>().map_err(|_| CliError::InvalidValue {
        flag: flag.to_string(),
        value,
    })
}

/// Negative counts clamp to zero (zero disables the capture).
fn count_value<I, S>(flag: &str, iter: &mut I) -> Result<usize, CliError>
where
    I: Iterator<Item = S>,
    S: AsRef<str>,
{
    Ok(int_value(flag, iter)?.max(0) as usize)
}

/// Non-positive values fall back to the documented default.
fn floored_value<I, S>(flag: &str, iter: &mut I, default: usize) -> Result<usize, CliError>
where
    I: Iterator<Item = S>,
    S: AsRef<str>,
{
    let value = int_value(flag, iter)?;
    if value <= 0 {
        Ok(default)
    } else {
        Ok(value as usize)
    }
}
