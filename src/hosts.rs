use std::collections::BTreeSet;

#[derive(Debug, thiserror::Error)]
pub enum HostRangeError {
    #[error("illegal hosts: {}", .0.join(","))]
    IllegalHosts(Vec<String>),
}

/// Expand a host range spec like `"1,3-5"` into sorted, deduplicated host
/// ids. Every malformed piece is collected so the user sees them all at
/// once.
pub fn expand_hosts(spec: &str) -> Result<Vec<u32>, HostRangeError> {
    let mut hosts = BTreeSet::new();
    let mut illegal = Vec::new();

    for piece in spec.split(',') {
        match piece.split_once('-') {
            None => match piece.trim().parse::<u32>() {
                Ok(id) => {
                    hosts.insert(id);
                }
                Err(_) => illegal.push(piece.to_string()),
            },
            Some((start, end)) => {
                match (start.trim().parse::<u32>(), end.trim().parse::<u32>()) {
                    (Ok(start), Ok(end)) => hosts.extend(start..=end),
                    _ => illegal.push(piece.to_string()),
                }
            }
        }
    }

    if illegal.is_empty() {
        Ok(hosts.into_iter().collect())
    } else {
        Err(HostRangeError::IllegalHosts(illegal))
    }
}

/// The command actually run for one remote host.
pub fn remote_command(host: u32, cmd: &str) -> String {
    format!("ssh n{host} \"{cmd}\"")
}
