use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use rusqlite::{Connection, OpenFlags, Row};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::graph::{Edge, EdgeKind};

/// Numeric identifier for a solar system.
pub type SystemId = i64;

/// Minimum Jaro-Winkler similarity for a name to be offered as a suggestion.
const FUZZY_MATCH_THRESHOLD: f64 = 0.8;

/// Static danger band derived from a system's security status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityClass {
    High,
    Low,
    Null,
}

impl SecurityClass {
    /// Classify a raw security status.
    ///
    /// The status is rounded to one decimal first, which is the precision the
    /// game displays, so `0.45` counts as high security.
    pub fn from_status(status: f64) -> Self {
        let rounded = (status * 10.0).round() / 10.0;
        if rounded >= 0.5 {
            SecurityClass::High
        } else if rounded >= 0.0 {
            SecurityClass::Low
        } else {
            SecurityClass::Null
        }
    }
}

impl fmt::Display for SecurityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            SecurityClass::High => "high",
            SecurityClass::Low => "low",
            SecurityClass::Null => "null",
        };
        f.write_str(value)
    }
}

/// Representation of a solar system with optional metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct System {
    pub id: SystemId,
    pub name: String,
    pub region: Option<String>,
    pub constellation: Option<String>,
    pub security_status: Option<f64>,
}

impl System {
    /// Security band for this system, when the dataset carries a status.
    pub fn security_class(&self) -> Option<SecurityClass> {
        self.security_status.map(SecurityClass::from_status)
    }
}

/// In-memory representation of the universe graph.
///
/// Built once at startup and never mutated afterwards, so it can be shared
/// freely behind an `Arc`.
#[derive(Debug, Clone, Default)]
pub struct Starmap {
    pub systems: HashMap<SystemId, System>,
    /// Lower-cased system name to identifier.
    pub name_to_id: HashMap<String, SystemId>,
    pub adjacency: Arc<HashMap<SystemId, Vec<SystemId>>>,
}

impl Starmap {
    /// Lookup a system identifier by name, ignoring ASCII case.
    pub fn system_id_by_name(&self, name: &str) -> Option<SystemId> {
        self.name_to_id.get(&name.trim().to_lowercase()).copied()
    }

    /// Lookup a full system record by name, ignoring ASCII case.
    pub fn lookup_by_name(&self, name: &str) -> Option<&System> {
        self.system_id_by_name(name)
            .and_then(|id| self.systems.get(&id))
    }

    /// Lookup a system by identifier.
    pub fn system(&self, id: SystemId) -> Option<&System> {
        self.systems.get(&id)
    }

    /// Lookup a system name by identifier.
    pub fn system_name(&self, id: SystemId) -> Option<&str> {
        self.systems.get(&id).map(|sys| sys.name.as_str())
    }

    /// Systems reachable through a stargate from `id`, sorted by identifier.
    pub fn stargates(&self, id: SystemId) -> &[SystemId] {
        self.adjacency.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Stargate edges leaving `id`.
    pub fn neighbours(&self, id: SystemId) -> Vec<Edge> {
        self.stargates(id)
            .iter()
            .map(|&target| Edge {
                from: id,
                to: target,
                kind: EdgeKind::Stargate,
                wormhole: None,
            })
            .collect()
    }

    /// Number of systems in the dataset.
    pub fn len(&self) -> usize {
        self.systems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }

    /// Build a starmap from in-memory rows, applying the same validation as
    /// [`load_starmap`].
    pub fn from_parts(systems: Vec<System>, jumps: Vec<(SystemId, SystemId)>) -> Result<Self> {
        assemble_starmap(Path::new("<memory>"), systems, jumps)
    }

    /// Return up to `limit` system names that look like `name`, best first.
    pub fn fuzzy_system_matches(&self, name: &str, limit: usize) -> Vec<String> {
        let needle = name.trim().to_lowercase();
        let mut scored: Vec<(f64, &str)> = self
            .systems
            .values()
            .map(|system| {
                let score = strsim::jaro_winkler(&needle, &system.name.to_lowercase());
                (score, system.name.as_str())
            })
            .filter(|(score, _)| *score >= FUZZY_MATCH_THRESHOLD)
            .collect();

        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(b.1)));
        scored
            .into_iter()
            .take(limit)
            .map(|(_, name)| name.to_string())
            .collect()
    }

    /// Sorted system names starting with `prefix` (case-insensitive).
    pub fn systems_with_prefix(&self, prefix: &str, limit: usize) -> Vec<String> {
        let prefix = prefix.trim().to_lowercase();
        if prefix.is_empty() {
            return Vec::new();
        }
        let mut names: Vec<&str> = self
            .systems
            .values()
            .filter(|system| system.name.to_lowercase().starts_with(&prefix))
            .map(|system| system.name.as_str())
            .collect();
        names.sort_unstable();
        names.into_iter().take(limit).map(str::to_string).collect()
    }
}

/// Load the static universe graph from `path`.
///
/// Files ending in `.json` are read as an array of system records carrying
/// their neighbour ids; anything else is opened read-only as a SQLite
/// database. A missing or malformed dataset is reported as an error and is
/// expected to abort startup.
pub fn load_starmap(path: &Path) -> Result<Starmap> {
    if !path.exists() {
        return Err(Error::DatasetNotFound {
            path: path.to_path_buf(),
        });
    }

    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let (systems, jumps) = if is_json {
        debug!(path = %path.display(), "loading starmap from json");
        read_json_dataset(path)?
    } else {
        debug!(path = %path.display(), "loading starmap from sqlite");
        read_sqlite_dataset(path)?
    };

    assemble_starmap(path, systems, jumps)
}

#[derive(Debug, Deserialize)]
struct SystemRecord {
    system_id: SystemId,
    name: String,
    #[serde(default)]
    region: Option<String>,
    #[serde(default)]
    constellation: Option<String>,
    #[serde(default)]
    security_status: Option<f64>,
    #[serde(default, alias = "stargates")]
    neighbor_ids: Vec<SystemId>,
}

fn read_json_dataset(path: &Path) -> Result<(Vec<System>, Vec<(SystemId, SystemId)>)> {
    let raw = fs::read_to_string(path)?;
    let records: Vec<SystemRecord> =
        serde_json::from_str(&raw).map_err(|err| Error::DatasetCorrupt {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;

    let mut systems = Vec::with_capacity(records.len());
    let mut jumps = Vec::new();
    for record in records {
        jumps.extend(
            record
                .neighbor_ids
                .iter()
                .map(|&neighbour| (record.system_id, neighbour)),
        );
        systems.push(System {
            id: record.system_id,
            name: record.name,
            region: record.region,
            constellation: record.constellation,
            security_status: record.security_status,
        });
    }
    Ok((systems, jumps))
}

fn read_sqlite_dataset(path: &Path) -> Result<(Vec<System>, Vec<(SystemId, SystemId)>)> {
    let connection = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
    let schema = detect_schema(&connection)?;
    let systems = load_systems(&connection, &schema)?;
    let jumps = load_jumps(&connection)?;
    Ok((systems, jumps))
}

/// Optional parts of the SQLite layout discovered at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SchemaDefinition {
    region_join: bool,
    constellation_join: bool,
    security_column: bool,
}

fn detect_schema(connection: &Connection) -> Result<SchemaDefinition> {
    if !table_exists(connection, "systems")? || !table_exists(connection, "stargates")? {
        return Err(Error::UnsupportedSchema);
    }
    if !table_has_columns(connection, "systems", &["id", "name"])?
        || !table_has_columns(
            connection,
            "stargates",
            &["from_system_id", "to_system_id"],
        )?
    {
        return Err(Error::UnsupportedSchema);
    }

    let region_join = table_has_columns(connection, "systems", &["region_id"])?
        && table_exists(connection, "regions")?
        && table_has_columns(connection, "regions", &["id", "name"])?;
    let constellation_join = table_has_columns(connection, "systems", &["constellation_id"])?
        && table_exists(connection, "constellations")?
        && table_has_columns(connection, "constellations", &["id", "name"])?;
    let security_column = table_has_columns(connection, "systems", &["security_status"])?;

    Ok(SchemaDefinition {
        region_join,
        constellation_join,
        security_column,
    })
}

fn load_systems(connection: &Connection, schema: &SchemaDefinition) -> Result<Vec<System>> {
    let mut selects = vec![
        "s.id AS system_id".to_string(),
        "s.name AS system_name".to_string(),
    ];
    let mut joins = Vec::new();

    if schema.region_join {
        selects.push("r.name AS region_name".to_string());
        joins.push("LEFT JOIN regions r ON r.id = s.region_id");
    } else {
        selects.push("NULL AS region_name".to_string());
    }

    if schema.constellation_join {
        selects.push("c.name AS constellation_name".to_string());
        joins.push("LEFT JOIN constellations c ON c.id = s.constellation_id");
    } else {
        selects.push("NULL AS constellation_name".to_string());
    }

    if schema.security_column {
        selects.push("s.security_status AS security_status".to_string());
    } else {
        selects.push("NULL AS security_status".to_string());
    }

    let mut sql = format!("SELECT {} FROM systems s", selects.join(", "));
    for join in joins {
        sql.push(' ');
        sql.push_str(join);
    }

    let mut stmt = connection.prepare(&sql)?;
    let rows = stmt.query_map([], row_to_system)?;
    let mut systems = Vec::new();
    for entry in rows {
        systems.push(entry?);
    }
    Ok(systems)
}

fn load_jumps(connection: &Connection) -> Result<Vec<(SystemId, SystemId)>> {
    let mut stmt = connection.prepare("SELECT from_system_id, to_system_id FROM stargates")?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    let mut jumps = Vec::new();
    for row in rows {
        jumps.push(row?);
    }
    Ok(jumps)
}

fn row_to_system(row: &Row<'_>) -> rusqlite::Result<System> {
    Ok(System {
        id: row.get(0)?,
        name: row.get(1)?,
        region: row.get(2)?,
        constellation: row.get(3)?,
        security_status: row.get(4)?,
    })
}

/// Validate raw rows and build the immutable starmap.
///
/// Stargates are bidirectional, so every jump is inserted in both directions
/// and the adjacency lists are de-duplicated.
fn assemble_starmap(
    path: &Path,
    raw_systems: Vec<System>,
    jumps: Vec<(SystemId, SystemId)>,
) -> Result<Starmap> {
    if raw_systems.is_empty() {
        return Err(Error::DatasetCorrupt {
            path: path.to_path_buf(),
            message: "dataset contains no systems".to_string(),
        });
    }

    let mut systems = HashMap::with_capacity(raw_systems.len());
    let mut name_to_id = HashMap::with_capacity(raw_systems.len());
    for system in raw_systems {
        let key = system.name.to_lowercase();
        if systems.contains_key(&system.id) {
            return Err(Error::DatasetCorrupt {
                path: path.to_path_buf(),
                message: format!("duplicate system id {}", system.id),
            });
        }
        if let Some(existing) = name_to_id.get(&key) {
            warn!(
                name = %system.name,
                kept = existing,
                ignored = system.id,
                "duplicate system name; keeping first entry for lookups"
            );
        } else {
            name_to_id.insert(key, system.id);
        }
        systems.insert(system.id, system);
    }

    let mut adjacency: HashMap<SystemId, Vec<SystemId>> = HashMap::new();
    let mut skipped_edges = 0usize;
    for (from, to) in jumps {
        if from == to || !systems.contains_key(&from) || !systems.contains_key(&to) {
            skipped_edges += 1;
            continue;
        }
        adjacency.entry(from).or_default().push(to);
        adjacency.entry(to).or_default().push(from);
    }

    for neighbours in adjacency.values_mut() {
        neighbours.sort_unstable();
        neighbours.dedup();
    }

    if skipped_edges > 0 {
        warn!(
            skipped_edges,
            "ignored stargate edges referencing unknown systems",
        );
    }

    debug!(
        systems = systems.len(),
        connected = adjacency.len(),
        "starmap loaded"
    );

    Ok(Starmap {
        systems,
        name_to_id,
        adjacency: Arc::new(adjacency),
    })
}

fn table_exists(connection: &Connection, table: &str) -> Result<bool> {
    let mut stmt = connection
        .prepare("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1 LIMIT 1")?;
    let mut rows = stmt.query([table])?;
    Ok(rows.next()?.is_some())
}

fn table_has_columns(connection: &Connection, table: &str, required: &[&str]) -> Result<bool> {
    let pragma = format!("PRAGMA table_info('{table}')");
    let mut stmt = connection.prepare(&pragma)?;
    let mut rows = stmt.query([])?;

    let mut columns = Vec::new();
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        columns.push(name);
    }

    Ok(required.iter().all(|required| {
        columns
            .iter()
            .any(|column| column.eq_ignore_ascii_case(required))
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn security_class_uses_comparison_on_rounded_status() {
        assert_eq!(SecurityClass::from_status(1.0), SecurityClass::High);
        assert_eq!(SecurityClass::from_status(0.45), SecurityClass::High);
        assert_eq!(SecurityClass::from_status(0.44), SecurityClass::Low);
        assert_eq!(SecurityClass::from_status(0.0), SecurityClass::Low);
        assert_eq!(SecurityClass::from_status(-0.04), SecurityClass::Low);
        assert_eq!(SecurityClass::from_status(-0.06), SecurityClass::Null);
        assert_eq!(SecurityClass::from_status(-1.0), SecurityClass::Null);
    }

    fn system(id: SystemId, name: &str) -> System {
        System {
            id,
            name: name.to_string(),
            region: None,
            constellation: None,
            security_status: None,
        }
    }

    #[test]
    fn assemble_makes_stargates_symmetric_and_skips_dangling_edges() {
        let starmap = assemble_starmap(
            Path::new("mem"),
            vec![system(1, "Alpha"), system(2, "Beta"), system(3, "Gamma")],
            vec![(1, 2), (2, 1), (2, 3), (3, 99), (1, 1)],
        )
        .expect("valid dataset");

        assert_eq!(starmap.stargates(1), &[2]);
        assert_eq!(starmap.stargates(2), &[1, 3]);
        assert_eq!(starmap.stargates(3), &[2]);
        assert!(starmap.stargates(99).is_empty());
    }

    #[test]
    fn assemble_rejects_duplicate_ids() {
        let err = assemble_starmap(
            Path::new("mem"),
            vec![system(1, "Alpha"), system(1, "Beta")],
            Vec::new(),
        )
        .expect_err("duplicate id");
        assert!(matches!(err, Error::DatasetCorrupt { .. }));
    }

    #[test]
    fn assemble_rejects_empty_dataset() {
        let err = assemble_starmap(Path::new("mem"), Vec::new(), Vec::new())
            .expect_err("empty dataset");
        assert!(matches!(err, Error::DatasetCorrupt { .. }));
    }

    #[test]
    fn name_lookup_ignores_case_and_whitespace() {
        let starmap = assemble_starmap(
            Path::new("mem"),
            vec![system(30000142, "Jita")],
            Vec::new(),
        )
        .expect("valid dataset");
        assert_eq!(starmap.system_id_by_name("jita"), Some(30000142));
        assert_eq!(starmap.system_id_by_name(" JITA "), Some(30000142));
        assert!(starmap.lookup_by_name("Jit").is_none());
    }

    #[test]
    fn neighbours_are_stargate_edges() {
        let starmap = assemble_starmap(
            Path::new("mem"),
            vec![system(1, "Alpha"), system(2, "Beta")],
            vec![(1, 2)],
        )
        .expect("valid dataset");
        let edges = starmap.neighbours(1);
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].to, 2);
        assert_eq!(edges[0].kind, EdgeKind::Stargate);
    }
}
