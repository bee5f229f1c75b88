//! Boards, named update configurations, and the built-in catalog.

use crate::error::{Error, Result};
use crate::target::mcu::Microcontroller;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One physical board role on the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    /// Board name, used in every message about it.
    pub name: String,
    /// Identifier of the start-update command this board's bootloader listens on.
    pub start_update_can_id: u16,
    /// Identifier the bootloader acknowledges start-update with.
    pub update_ack_can_id: u16,
    /// Flash layout.
    pub mcu: Arc<Microcontroller>,
    /// Firmware image path, relative to the build directory.
    pub path: PathBuf,
}

impl Board {
    /// Create a board description.
    pub fn new(
        name: impl Into<String>,
        start_update_can_id: u16,
        update_ack_can_id: u16,
        mcu: Arc<Microcontroller>,
        path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            start_update_can_id,
            update_ack_can_id,
            mcu,
            path: path.into(),
        }
    }

    /// Image path resolved against a build directory.
    pub fn image_path(&self, build_dir: &Path) -> PathBuf {
        build_dir.join(&self.path)
    }
}

/// A named, ordered list of boards updated together.
#[derive(Debug, Clone)]
pub struct BoardConfig {
    /// Configuration name, e.g. `quadruna`.
    pub name: String,
    /// Boards in update order.
    pub boards: Vec<Board>,
}

/// Identifier on which a board broadcasts its firmware commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitSource {
    /// Broadcast identifier.
    pub can_id: u16,
    /// Board name.
    pub board: &'static str,
}

/// Commit-info broadcast identifiers of the quadruna car.
pub const COMMIT_SOURCES: &[CommitSource] = &[
    CommitSource { can_id: 140, board: "BMS" },
    CommitSource { can_id: 506, board: "CRIT" },
    CommitSource { can_id: 819, board: "dimos" },
    CommitSource { can_id: 302, board: "FSM" },
    CommitSource { can_id: 419, board: "RSM" },
    CommitSource { can_id: 204, board: "VC" },
];

/// Static catalog of boards and named configurations.
///
/// Built once at startup and read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    configs: Vec<BoardConfig>,
}

impl Catalog {
    /// Empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in boards: the five quadruna ECUs and the h7dev board.
    pub fn builtin() -> Self {
        let f412 = Arc::new(Microcontroller::stm32f412());
        let h733 = Arc::new(Microcontroller::stm32h733());

        let car_board = |name: &str, start: u16, mcu: &Arc<Microcontroller>| {
            Board::new(
                name,
                start,
                start + 1,
                Arc::clone(mcu),
                Path::new("firmware")
                    .join("quadruna")
                    .join(name)
                    .join(format!("quadruna_{name}_app_metadata.hex")),
            )
        };

        let vc = car_board("VC", 1210, &h733);
        let bms = car_board("BMS", 1200, &h733);
        let fsm = car_board("FSM", 1220, &f412);
        let rsm = car_board("RSM", 1230, &f412);
        let crit = car_board("CRIT", 1240, &f412);
        let h7dev = Board::new(
            "h7dev",
            1300,
            1301,
            Arc::clone(&h733),
            Path::new("firmware")
                .join("dev")
                .join("h7dev")
                .join("h7dev_app_metadata.hex"),
        );

        let mut catalog = Self::new();
        let car = [vc, bms, fsm, rsm, crit];
        for board in &car {
            catalog.insert(format!("quadruna_{}", board.name), vec![board.clone()]);
        }
        catalog.insert("quadruna", car.to_vec());
        catalog.insert("h7dev", vec![h7dev]);
        catalog
    }

    /// Add or replace a named configuration.
    pub fn insert(&mut self, name: impl Into<String>, boards: Vec<Board>) {
        let name = name.into();
        if let Some(existing) = self.configs.iter_mut().find(|c| c.name == name) {
            existing.boards = boards;
        } else {
            self.configs.push(BoardConfig { name, boards });
        }
    }

    /// Boards of a named configuration, in update order.
    pub fn config(&self, name: &str) -> Result<&[Board]> {
        self.configs
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.boards.as_slice())
            .ok_or_else(|| {
                Error::Config(format!(
                    "unknown configuration '{name}' (available: {})",
                    self.names().join(", ")
                ))
            })
    }

    /// All configuration names, in insertion order.
    pub fn names(&self) -> Vec<&str> {
        self.configs.iter().map(|c| c.name.as_str()).collect()
    }

    /// All configurations.
    pub fn configs(&self) -> &[BoardConfig] {
        &self.configs
    }

    /// Find a board by name in any configuration.
    pub fn board(&self, name: &str) -> Option<&Board> {
        self.configs
            .iter()
            .flat_map(|c| c.boards.iter())
            .find(|b| b.name == name)
    }
}
