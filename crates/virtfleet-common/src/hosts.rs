//! The flat hosts-file format shared by the fleet and benchmark tools.
//!
//! One `<address><TAB><name>` pair per line, wrapped in BEGIN/END marker
//! lines carrying the count. Parsing is lenient: comments and lines with
//! fewer than two fields are skipped, not errors.

use std::collections::BTreeMap;
use std::io::Write;

use crate::Result;

/// Ordered mapping from VM/host name to address.
pub type HostMap = BTreeMap<String, String>;

/// Write the host map in the exchange format.
pub fn dump_hosts<W: Write>(hosts: &HostMap, out: &mut W) -> Result<()> {
    writeln!(out, "# BEGIN {} available VMs", hosts.len())?;
    for (name, address) in hosts {
        writeln!(out, "{}\t{}", address, name)?;
    }
    writeln!(out, "# END {} available VMs", hosts.len())?;
    out.flush()?;
    Ok(())
}

/// Parse a host map. The first two whitespace-separated fields of each line
/// are address and name; `#`-prefixed and short lines are ignored.
pub fn parse_hosts(input: &str) -> HostMap {
    let mut hosts = HostMap::new();
    for line in input.lines() {
        let line = line.trim();
        if line.starts_with('#') {
            continue;
        }
        let mut fields = line.split_whitespace();
        let (Some(address), Some(name)) = (fields.next(), fields.next()) else {
            continue;
        };
        hosts.insert(name.to_string(), address.to_string());
    }
    hosts
}
