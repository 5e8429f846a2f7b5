//! `SQLite`-backed fact store.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info};

use super::seed::attribute_text;
use super::{
    AbsorberRow, ArchitectureRow, DefectImpactRow, Entity, EntityDetail, FactQuery, FactSeed,
    FactSummary, QueryRow, Triple,
};
use crate::error::FactError;

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS entities (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    name        TEXT NOT NULL,
    type        TEXT NOT NULL,
    description TEXT,
    UNIQUE (name, type)
);
CREATE TABLE IF NOT EXISTS attributes (
    entity_id INTEGER NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
    key       TEXT NOT NULL,
    value     TEXT NOT NULL,
    PRIMARY KEY (entity_id, key)
);
CREATE TABLE IF NOT EXISTS relations (
    subject_id INTEGER NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
    predicate  TEXT NOT NULL,
    object_id  INTEGER NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
    PRIMARY KEY (subject_id, predicate, object_id)
);
CREATE INDEX IF NOT EXISTS idx_entities_type ON entities(type);
CREATE INDEX IF NOT EXISTS idx_relations_predicate ON relations(predicate);
";

const BANDGAP_KEY: &str = "bandgap_eV";
const CRYSTAL_KEY: &str = "crystalStructure";
const EFFICIENCY_KEY: &str = "recordEfficiency_pct";
const AFFECTS_METRIC: &str = "affectsMetric";

/// Fact store over a single `SQLite` database file.
///
/// Access to the connection is serialized through a mutex, so the store can
/// be shared across tasks behind an `Arc`.
pub struct SqliteFactStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for SqliteFactStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteFactStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqliteFactStore {
    /// Opens (or creates) a database file and ensures the schema exists.
    pub fn open(path: &Path) -> Result<Self, FactError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| FactError::Seed {
                message: format!("cannot create {}: {e}", parent.display()),
            })?;
        }
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        };
        store.init()?;
        Ok(store)
    }

    /// Opens an existing database and fails if it holds no entities.
    pub fn open_existing(path: &Path) -> Result<Self, FactError> {
        let store = Self::open(path)?;
        if !store.is_initialized()? {
            return Err(FactError::NotInitialized {
                path: path.to_path_buf(),
            });
        }
        Ok(store)
    }

    /// Creates an in-memory store, mainly for tests.
    pub fn in_memory() -> Result<Self, FactError> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
            path: None,
        };
        store.init()?;
        Ok(store)
    }

    fn init(&self) -> Result<(), FactError> {
        let conn = self.lock();
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns true once at least one entity has been imported.
    pub fn is_initialized(&self) -> Result<bool, FactError> {
        let conn = self.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM entities", [], |r| r.get(0))?;
        Ok(count > 0)
    }

    /// Loads a seed in one transaction.
    ///
    /// With `replace` set, existing facts are removed first. Relations that
    /// name unknown entities fail the whole import.
    pub fn import(&self, seed: &FactSeed, replace: bool) -> Result<FactSummary, FactError> {
        {
            let mut conn = self.lock();
            let tx = conn.transaction()?;
            if replace {
                tx.execute_batch(
                    "DELETE FROM relations; DELETE FROM attributes; DELETE FROM entities;",
                )?;
            }

            let mut ids: HashMap<String, i64> = HashMap::new();
            for entity in &seed.entities {
                tx.execute(
                    "INSERT INTO entities (name, type, description) VALUES (?1, ?2, ?3)
                     ON CONFLICT(name, type) DO UPDATE SET description = excluded.description",
                    params![entity.name, entity.entity_type, entity.description],
                )?;
                let id: i64 = tx.query_row(
                    "SELECT id FROM entities WHERE name = ?1 AND type = ?2",
                    params![entity.name, entity.entity_type],
                    |r| r.get(0),
                )?;
                for (key, value) in &entity.attributes {
                    tx.execute(
                        "INSERT OR REPLACE INTO attributes (entity_id, key, value) VALUES (?1, ?2, ?3)",
                        params![id, key, attribute_text(value)],
                    )?;
                }
                ids.entry(entity.name.clone()).or_insert(id);
            }

            for relation in &seed.relations {
                let subject = resolve_id(&tx, &ids, &relation.subject)?;
                let object = resolve_id(&tx, &ids, &relation.object)?;
                tx.execute(
                    "INSERT OR IGNORE INTO relations (subject_id, predicate, object_id) VALUES (?1, ?2, ?3)",
                    params![subject, relation.predicate, object],
                )?;
            }
            tx.commit()?;
        }

        let summary = self.summary()?;
        info!(
            entities = summary.entity_count,
            relations = summary.relation_count,
            "fact seed imported"
        );
        Ok(summary)
    }

    fn attributes_for(conn: &Connection, id: i64) -> Result<BTreeMap<String, String>, FactError> {
        let mut stmt =
            conn.prepare_cached("SELECT key, value FROM attributes WHERE entity_id = ?1")?;
        let rows = stmt.query_map([id], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))?;
        Ok(rows.collect::<Result<BTreeMap<_, _>, _>>()?)
    }

    fn entities_where(
        conn: &Connection,
        clause: &str,
        param: Option<&str>,
    ) -> Result<Vec<Entity>, FactError> {
        let sql = format!(
            "SELECT id, name, type, description FROM entities {clause} ORDER BY type, name"
        );
        let mut stmt = conn.prepare(&sql)?;
        let map = |r: &rusqlite::Row<'_>| {
            Ok((
                r.get::<_, i64>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, Option<String>>(3)?,
            ))
        };
        let rows = match param {
            Some(p) => stmt.query_map([p], map)?.collect::<Result<Vec<_>, _>>()?,
            None => stmt.query_map([], map)?.collect::<Result<Vec<_>, _>>()?,
        };

        rows.into_iter()
            .map(|(id, name, entity_type, description)| {
                Ok(Entity {
                    name,
                    entity_type,
                    description,
                    attributes: Self::attributes_for(conn, id)?,
                })
            })
            .collect()
    }
}

fn resolve_id(
    conn: &Connection,
    ids: &HashMap<String, i64>,
    name: &str,
) -> Result<i64, FactError> {
    if let Some(id) = ids.get(name) {
        return Ok(*id);
    }
    conn.query_row(
        "SELECT id FROM entities WHERE name = ?1 ORDER BY id LIMIT 1",
        [name],
        |r| r.get(0),
    )
    .optional()?
    .ok_or_else(|| FactError::Seed {
        message: format!("relation refers to unknown entity '{name}'"),
    })
}

fn parse_number(value: Option<String>) -> Option<f64> {
    value.and_then(|v| v.trim().parse().ok())
}

fn json_value(value: ValueRef<'_>) -> serde_json::Value {
    match value {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(i) => serde_json::Value::from(i),
        ValueRef::Real(f) => serde_json::Value::from(f),
        ValueRef::Text(t) => serde_json::Value::from(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => serde_json::Value::from(hex::encode(b)),
    }
}

impl FactQuery for SqliteFactStore {
    fn list_entities(&self, type_filter: Option<&str>) -> Result<Vec<Entity>, FactError> {
        let conn = self.lock();
        match type_filter {
            Some(t) => Self::entities_where(&conn, "WHERE type = ?1", Some(t)),
            None => Self::entities_where(&conn, "", None),
        }
    }

    fn entity_details(&self, name: &str) -> Result<Vec<EntityDetail>, FactError> {
        let conn = self.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT 'name', NULL, e.name FROM entities e WHERE e.name = ?1
             UNION ALL
             SELECT 'description', NULL, e.description FROM entities e
                 WHERE e.name = ?1 AND e.description IS NOT NULL
             UNION ALL
             SELECT a.key, NULL, a.value FROM attributes a
                 JOIN entities e ON e.id = a.entity_id WHERE e.name = ?1
             UNION ALL
             SELECT r.predicate, o.name, NULL FROM relations r
                 JOIN entities e ON e.id = r.subject_id
                 JOIN entities o ON o.id = r.object_id WHERE e.name = ?1",
        )?;
        let rows = stmt.query_map([name], |r| {
            Ok(EntityDetail {
                relation: r.get(0)?,
                target_name: r.get(1)?,
                literal_value: r.get(2)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn search_by_keyword(&self, keyword: &str) -> Result<Vec<Entity>, FactError> {
        let conn = self.lock();
        let pattern = format!("%{}%", keyword.to_lowercase());
        Self::entities_where(
            &conn,
            "WHERE lower(name) LIKE ?1 OR lower(coalesce(description, '')) LIKE ?1",
            Some(&pattern),
        )
    }

    fn absorbers(&self) -> Result<Vec<AbsorberRow>, FactError> {
        let conn = self.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT e.name, e.description, bg.value, cs.value FROM entities e
             LEFT JOIN attributes bg ON bg.entity_id = e.id AND bg.key = ?1
             LEFT JOIN attributes cs ON cs.entity_id = e.id AND cs.key = ?2
             WHERE e.type = 'Absorber'",
        )?;
        let mut rows = stmt
            .query_map(params![BANDGAP_KEY, CRYSTAL_KEY], |r| {
                Ok(AbsorberRow {
                    name: r.get(0)?,
                    description: r.get(1)?,
                    bandgap_ev: parse_number(r.get(2)?),
                    crystal_structure: r.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        // Unknown bandgaps sort last.
        rows.sort_by(|a, b| {
            a.bandgap_ev
                .unwrap_or(f64::INFINITY)
                .total_cmp(&b.bandgap_ev.unwrap_or(f64::INFINITY))
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(rows)
    }

    fn architectures(&self) -> Result<Vec<ArchitectureRow>, FactError> {
        let conn = self.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT e.name, e.description, eff.value FROM entities e
             LEFT JOIN attributes eff ON eff.entity_id = e.id AND eff.key = ?1
             WHERE e.type = 'CellArchitecture'",
        )?;
        let mut rows = stmt
            .query_map([EFFICIENCY_KEY], |r| {
                Ok(ArchitectureRow {
                    name: r.get(0)?,
                    description: r.get(1)?,
                    record_efficiency_pct: parse_number(r.get(2)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.sort_by(|a, b| {
            b.record_efficiency_pct
                .unwrap_or(f64::NEG_INFINITY)
                .total_cmp(&a.record_efficiency_pct.unwrap_or(f64::NEG_INFINITY))
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(rows)
    }

    fn defects_with_impacts(&self) -> Result<Vec<DefectImpactRow>, FactError> {
        let conn = self.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT d.name, d.description, m.name FROM entities d
             LEFT JOIN relations r ON r.subject_id = d.id AND r.predicate = ?1
             LEFT JOIN entities m ON m.id = r.object_id
             WHERE d.type = 'Defect'
             ORDER BY d.name, m.name",
        )?;
        let rows = stmt.query_map([AFFECTS_METRIC], |r| {
            Ok(DefectImpactRow {
                defect: r.get(0)?,
                description: r.get(1)?,
                metric: r.get(2)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn relationships(&self) -> Result<Vec<Triple>, FactError> {
        let conn = self.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT s.name, r.predicate, o.name FROM relations r
             JOIN entities s ON s.id = r.subject_id
             JOIN entities o ON o.id = r.object_id
             ORDER BY r.predicate, s.name, o.name",
        )?;
        let rows = stmt.query_map([], |r| {
            Ok(Triple {
                subject: r.get(0)?,
                relation: r.get(1)?,
                object: r.get(2)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn summary(&self) -> Result<FactSummary, FactError> {
        let conn = self.lock();
        let count = |sql: &str| -> Result<usize, FactError> {
            let n: i64 = conn.query_row(sql, [], |r| r.get(0))?;
            Ok(usize::try_from(n).unwrap_or(0))
        };
        let entity_count = count("SELECT COUNT(*) FROM entities")?;
        let attribute_count = count("SELECT COUNT(*) FROM attributes")?;
        let relation_count = count("SELECT COUNT(*) FROM relations")?;

        let mut stmt = conn.prepare_cached("SELECT type, COUNT(*) FROM entities GROUP BY type")?;
        let by_type = stmt
            .query_map([], |r| {
                let n: i64 = r.get(1)?;
                Ok((r.get::<_, String>(0)?, usize::try_from(n).unwrap_or(0)))
            })?
            .collect::<Result<BTreeMap<_, _>, _>>()?;

        Ok(FactSummary {
            total_facts: entity_count + attribute_count + relation_count,
            entity_count,
            relation_count,
            by_type,
        })
    }

    fn raw_query(&self, query: &str, max_rows: usize) -> Result<Vec<QueryRow>, FactError> {
        if !is_select(query) {
            return Err(FactError::NotReadOnly);
        }
        let conn = self.lock();
        let mut stmt = conn.prepare(query)?;
        if !stmt.readonly() {
            return Err(FactError::NotReadOnly);
        }
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while out.len() < max_rows {
            let Some(row) = rows.next()? else {
                break;
            };
            let mut object = QueryRow::new();
            for (i, column) in columns.iter().enumerate() {
                object.insert(column.clone(), json_value(row.get_ref(i)?));
            }
            out.push(object);
        }
        debug!(rows = out.len(), max_rows, "raw query executed");
        Ok(out)
    }
}

/// True when the statement opens with `SELECT` or `WITH`.
///
/// `Statement::readonly` alone lets `ATTACH`, `DETACH` and transaction
/// control through, since none of them write to the main database.
fn is_select(query: &str) -> bool {
    let keyword: String = query
        .trim_start()
        .chars()
        .take_while(char::is_ascii_alphabetic)
        .collect();
    keyword.eq_ignore_ascii_case("select") || keyword.eq_ignore_ascii_case("with")
}
