use anyhow::Result;
use clap::ValueEnum;
use serde::Serialize;

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum OutputFormat {
    Human,
    Json,
    Yaml,
}

/// Plain-text rendering of a command report.
pub trait HumanReadable {
    fn render(&self) -> String;
}

pub fn emit<T>(format: OutputFormat, report: &T) -> Result<()>
where
    T: Serialize + HumanReadable,
{
    match format {
        OutputFormat::Human => print!("{}", report.render()),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(report)?),
    }
    Ok(())
}

pub fn join_or_none<I, S>(items: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let joined = items
        .into_iter()
        .map(|item| item.as_ref().to_string())
        .collect::<Vec<_>>()
        .join(", ");
    if joined.is_empty() {
        "(none)".to_string()
    } else {
        joined
    }
}
