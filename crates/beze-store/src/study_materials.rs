//! CRUD operations for [`StudyMaterial`] records.

use beze_shared::{StudyMaterial, StudyMaterialId, UserId};
use rusqlite::params;

use crate::channels::{conversion_error, parse_uuid};
use crate::database::Database;
use crate::error::{classify, Result};

impl Database {
    pub fn insert_study_material(&self, material: &StudyMaterial) -> Result<()> {
        self.conn()
            .execute(
                "INSERT INTO study_materials (id, name, filename, tags, author_id, created, updated)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    material.id.to_string(),
                    material.name,
                    material.filename,
                    serde_json::to_string(&material.tags)?,
                    material.author_id.as_str(),
                    material.created,
                    material.updated,
                ],
            )
            .map_err(classify)?;
        Ok(())
    }

    pub fn get_study_material(&self, id: StudyMaterialId) -> Result<StudyMaterial> {
        self.conn()
            .query_row(
                "SELECT id, name, filename, tags, author_id, created, updated
                 FROM study_materials
                 WHERE id = ?1",
                params![id.to_string()],
                row_to_study_material,
            )
            .map_err(classify)
    }

    /// Materials uploaded by one author, newest first.
    pub fn list_study_materials_by_author(&self, author: &UserId) -> Result<Vec<StudyMaterial>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, name, filename, tags, author_id, created, updated
             FROM study_materials
             WHERE author_id = ?1
             ORDER BY created DESC, rowid DESC",
        )?;
        let rows = stmt.query_map(params![author.as_str()], row_to_study_material)?;

        let mut materials = Vec::new();
        for row in rows {
            materials.push(row?);
        }
        Ok(materials)
    }
}

fn row_to_study_material(row: &rusqlite::Row<'_>) -> rusqlite::Result<StudyMaterial> {
    let id_str: String = row.get(0)?;
    let tags_json: String = row.get(3)?;
    let author: String = row.get(4)?;

    Ok(StudyMaterial {
        id: StudyMaterialId(parse_uuid(0, &id_str)?),
        name: row.get(1)?,
        filename: row.get(2)?,
        tags: serde_json::from_str(&tags_json).map_err(|e| conversion_error(3, e))?,
        author_id: UserId(author),
        created: row.get(5)?,
        updated: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_list_by_author() {
        let db = Database::open_in_memory().unwrap();
        let alice = UserId::from("alice");
        let first = StudyMaterial::new("Calculus", "calc.pdf", vec!["math".into()], alice.clone(), 1);
        let second = StudyMaterial::new("Algebra", "alg.pdf", vec![], alice.clone(), 2);
        let other = StudyMaterial::new("Poems", "p.pdf", vec![], UserId::from("bob"), 3);
        for m in [&first, &second, &other] {
            db.insert_study_material(m).unwrap();
        }

        assert_eq!(db.get_study_material(first.id).unwrap(), first);
        let listed = db.list_study_materials_by_author(&alice).unwrap();
        assert_eq!(listed, vec![second, first]);
    }
}
