// ABOUTME: Plate layout CSV parsing and well-to-isolate resolution
// ABOUTME: Maps plate id + well coordinate to the real sample identifier

use std::collections::HashMap;
use std::path::Path;

use tracing::debug;
use walkdir::WalkDir;

use super::error::{Result, SampleError};
use super::naming::Well;

const PLATE_ROWS: usize = 8;
const PLATE_COLS: usize = 12;

/// One 96-well plate layout: an 8x12 grid of isolate IDs. Empty cells
/// stay empty and resolve to nothing.
#[derive(Debug, Clone)]
pub struct PlateLayout {
    pub id: String,
    grid: Vec<Vec<String>>,
}

impl PlateLayout {
    /// Parse a plate CSV. Accepted shapes are a bare 8x12 grid, or the
    /// same grid with a header row of column numbers and/or a leading
    /// row-letter column; headers are detected and dropped.
    pub fn from_file(path: &Path) -> Result<Self> {
        let id = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let content = std::fs::read_to_string(path)?;

        let mut rows: Vec<Vec<String>> = content
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(_, line)| {
                line.split(&[',', ';'])
                    .map(|cell| cell.trim().to_string())
                    .collect()
            })
            .collect();

        // header row: first cell empty or all remaining cells numeric
        if let Some(first) = rows.first() {
            let is_header = !first.is_empty()
                && (first[0].is_empty()
                    || (first.len() > 1 && first.iter().skip(1).all(|c| c.parse::<u8>().is_ok())));
            if is_header {
                rows.remove(0);
            }
        }

        // leading row-letter column
        let has_row_letters = rows.iter().all(|r| {
            r.first()
                .map(|c| c.len() == 1 && c.chars().all(|ch| ch.is_ascii_alphabetic()))
                .unwrap_or(false)
        });
        if has_row_letters {
            for row in rows.iter_mut() {
                row.remove(0);
            }
        }

        if rows.len() != PLATE_ROWS {
            return Err(SampleError::MalformedPlate {
                path: path.to_path_buf(),
                row: rows.len(),
                reason: format!("expected {} rows, found {}", PLATE_ROWS, rows.len()),
            });
        }
        for (i, row) in rows.iter_mut().enumerate() {
            if row.len() > PLATE_COLS {
                return Err(SampleError::MalformedPlate {
                    path: path.to_path_buf(),
                    row: i + 1,
                    reason: format!("expected at most {} columns, found {}", PLATE_COLS, row.len()),
                });
            }
            row.resize(PLATE_COLS, String::new());
        }

        Ok(Self { id, grid: rows })
    }

    pub fn lookup(&self, well: Well) -> Option<&str> {
        self.grid
            .get(well.row as usize)
            .and_then(|row| row.get(well.col as usize))
            .map(String::as_str)
            .filter(|cell| !cell.is_empty())
    }
}

/// All plate layouts found under the configured CSV directory, keyed by
/// plate id (the CSV file stem).
#[derive(Debug, Clone, Default)]
pub struct PlateBook {
    plates: HashMap<String, PlateLayout>,
}

impl PlateBook {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn load(csv_dir: &Path) -> Result<Self> {
        let mut plates = HashMap::new();
        for entry in WalkDir::new(csv_dir).into_iter().filter_map(|e| e.ok()) {
            let path = entry.path();
            if path.extension().map(|e| e == "csv").unwrap_or(false) {
                let layout = PlateLayout::from_file(path)?;
                debug!("loaded plate layout '{}' from {}", layout.id, path.display());
                plates.insert(layout.id.clone(), layout);
            }
        }
        Ok(Self { plates })
    }

    pub fn len(&self) -> usize {
        self.plates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plates.is_empty()
    }

    /// Resolve a plate/well pair to an isolate ID.
    pub fn resolve(&self, plate: &str, well: Well, trace: &Path) -> Result<String> {
        let layout = self
            .plates
            .get(plate)
            .ok_or_else(|| SampleError::PlateNotFound {
                plate: plate.to_string(),
                trace: trace.to_path_buf(),
            })?;
        layout
            .lookup(well)
            .map(str::to_string)
            .ok_or_else(|| SampleError::WellOffPlate {
                plate: plate.to_string(),
                well: well.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn bare_grid() -> String {
        (0..8)
            .map(|r| {
                (0..12)
                    .map(|c| format!("iso_{}_{}", r, c))
                    .collect::<Vec<_>>()
                    .join(",")
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_bare_grid_lookup() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("D15.csv");
        std::fs::write(&path, bare_grid()).unwrap();

        let plate = PlateLayout::from_file(&path).unwrap();
        assert_eq!(plate.id, "D15");
        assert_eq!(plate.lookup(Well { row: 0, col: 0 }), Some("iso_0_0"));
        assert_eq!(plate.lookup(Well { row: 7, col: 11 }), Some("iso_7_11"));
    }

    #[test]
    fn test_headered_grid() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("P1.csv");
        let mut content = String::from(",1,2,3,4,5,6,7,8,9,10,11,12\n");
        for (i, letter) in "ABCDEFGH".chars().enumerate() {
            content.push_str(&format!(
                "{},{}\n",
                letter,
                (0..12)
                    .map(|c| format!("s{}x{}", i, c))
                    .collect::<Vec<_>>()
                    .join(",")
            ));
        }
        std::fs::write(&path, content).unwrap();

        let plate = PlateLayout::from_file(&path).unwrap();
        assert_eq!(plate.lookup(Well { row: 1, col: 2 }), Some("s1x2"));
    }

    #[test]
    fn test_wrong_row_count_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(&path, "a,b,c\nd,e,f\n").unwrap();

        assert!(matches!(
            PlateLayout::from_file(&path),
            Err(SampleError::MalformedPlate { .. })
        ));
    }

    #[test]
    fn test_plate_book_resolution() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("D15.csv"), bare_grid()).unwrap();

        let book = PlateBook::load(dir.path()).unwrap();
        assert_eq!(book.len(), 1);

        let id = book
            .resolve("D15", Well { row: 2, col: 3 }, Path::new("x.ab1"))
            .unwrap();
        assert_eq!(id, "iso_2_3");

        assert!(matches!(
            book.resolve("Q9", Well { row: 0, col: 0 }, Path::new("x.ab1")),
            Err(SampleError::PlateNotFound { .. })
        ));
    }

    #[test]
    fn test_empty_cell_resolves_to_off_plate() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("P2.csv");
        let mut grid = bare_grid();
        grid = grid.replacen("iso_0_0", "", 1);
        std::fs::write(&path, &grid).unwrap();

        let book = PlateBook::load(dir.path()).unwrap();
        assert!(matches!(
            book.resolve("P2", Well { row: 0, col: 0 }, Path::new("x.ab1")),
            Err(SampleError::WellOffPlate { .. })
        ));
    }
}
