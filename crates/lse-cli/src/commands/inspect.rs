use std::io::{self, Write};
use std::path::Path;

use anyhow::Result;
use lse_core::{GroupRole, MeasurementMap};
use tabwriter::TabWriter;

use super::load_model;

pub fn handle(model: &Path) -> Result<()> {
    let network = load_model(model)?.build()?;
    println!("{}", network.stats());

    let diagnostics = network.diagnostics();
    if !diagnostics.issues.is_empty() {
        println!("Diagnostics ({}):", diagnostics.summary());
        for issue in &diagnostics.issues {
            println!("  {issue}");
        }
    }

    let map = MeasurementMap::from_network(&network);
    println!("{} telemetry keys mapped", map.len());

    let mut writer = TabWriter::new(io::stdout());
    writeln!(writer, "GROUP\tROLE\tTARGET\tBASE kV\tENABLED")?;
    for group in network.groups() {
        let (role, target) = match group.role {
            GroupRole::Voltage { bus } => ("voltage", bus.to_string()),
            GroupRole::CurrentFlow { branch, end } => ("flow", format!("{branch} ({end:?})")),
            GroupRole::CurrentInjection { shunt } => ("injection", shunt.to_string()),
        };
        writeln!(
            writer,
            "{}\t{}\t{}\t{}\t{}",
            group.name,
            role,
            target,
            group.level().base_kv.value(),
            group.enabled
        )?;
    }
    writer.flush()?;
    Ok(())
}
