//! Pixel placement: validation, the external placement policy, commit and
//! broadcast.

use crate::collab::{PlaceOutcome, User};
use crate::hub::Hub;
use plaza_canvas::addressing::{self, Axis};
use plaza_canvas::Cell;
use plaza_common::{Canvas, CanvasId, ChunkCoord, PixelCoord};
use plaza_logger::{log, LogSeverity::*};
use plaza_protocol::pixel_return::PixelReturnPacket;
use plaza_protocol::pixel_update::PixelUpdatePacket;
use plaza_protocol::ReturnCode;

fn axis_code(axis: Axis) -> ReturnCode {
    match axis {
        Axis::X => ReturnCode::XOutOfBounds,
        Axis::Y => ReturnCode::YOutOfBounds,
        Axis::Z => ReturnCode::ZOutOfBounds,
    }
}

impl PlaceOutcome {
    pub fn to_packet(&self) -> PixelReturnPacket {
        PixelReturnPacket::new(self.code, self.wait_ms(), self.cool_down_i16())
    }
}

impl Hub {
    fn canvas(&self, canvas_id: Option<CanvasId>) -> Option<(CanvasId, Canvas)> {
        let id = canvas_id?;
        let canvas = self.store().canvases().get(id)?.clone();
        Some((id, canvas))
    }

    /// Handles a PixelUpdate request of a client whose current canvas is
    /// `canvas_id`.
    pub async fn place_from_packet(
        &self,
        user: &User,
        canvas_id: Option<CanvasId>,
        packet: PixelUpdatePacket,
    ) -> PlaceOutcome {
        let Some((canvas_id, canvas)) = self.canvas(canvas_id) else {
            return PlaceOutcome::rejected(ReturnCode::InvalidCanvas);
        };
        let chunk = packet.chunk();
        let per_side = canvas.chunks_per_side();
        if chunk.i >= per_side {
            return PlaceOutcome::rejected(ReturnCode::XOutOfBounds);
        }
        if chunk.j >= per_side {
            return PlaceOutcome::rejected(if canvas.is_3d {
                ReturnCode::ZOutOfBounds
            } else {
                ReturnCode::YOutOfBounds
            });
        }
        if packet.offset as usize >= canvas.chunk_len() {
            return PlaceOutcome::rejected(ReturnCode::YOutOfBounds);
        }
        let coord = addressing::pixel_from_chunk_offset(
            chunk.i,
            chunk.j,
            packet.offset,
            canvas.size,
            canvas.is_3d,
        );
        if let Some(axis) = addressing::out_of_bounds_axis(&canvas, coord) {
            return PlaceOutcome::rejected(axis_code(axis));
        }
        self.place_validated(user, canvas_id, chunk, packet.offset, coord, packet.color)
            .await
    }

    /// Handles a placement addressed by world coordinates, as the bridge
    /// sends them.
    pub async fn place_at_coords(
        &self,
        user: &User,
        canvas_id: CanvasId,
        coord: PixelCoord,
        color: u8,
    ) -> PlaceOutcome {
        let Some((canvas_id, canvas)) = self.canvas(Some(canvas_id)) else {
            return PlaceOutcome::rejected(ReturnCode::InvalidCanvas);
        };
        if let Some(axis) = addressing::out_of_bounds_axis(&canvas, coord) {
            return PlaceOutcome::rejected(axis_code(axis));
        }
        let Some((chunk, offset)) = addressing::address_of(&canvas, coord) else {
            return PlaceOutcome::rejected(ReturnCode::Unknown);
        };
        self.place_validated(user, canvas_id, chunk, offset, coord, color)
            .await
    }

    async fn place_validated(
        &self,
        user: &User,
        canvas_id: CanvasId,
        chunk: ChunkCoord,
        offset: u32,
        coord: PixelCoord,
        color: u8,
    ) -> PlaceOutcome {
        if color as usize >= self.palette().len() {
            return PlaceOutcome::rejected(ReturnCode::InvalidColor);
        }
        match self
            .store()
            .get_pixel_by_offset(canvas_id, chunk.i, chunk.j, offset)
            .await
        {
            Ok(cell) if cell.is_protected() => {
                return PlaceOutcome::rejected(ReturnCode::Protected);
            }
            Ok(_) => {}
            Err(e) => {
                log(format!("Could not read pixel {:?} on canvas {}: {}", coord, canvas_id, e), Error);
                return PlaceOutcome::rejected(ReturnCode::Unknown);
            }
        }

        let outcome = self
            .collaborators()
            .placer
            .place(user, canvas_id, color, coord)
            .await;
        if !outcome.success() {
            return outcome;
        }
        match self.commit_pixel(canvas_id, chunk, offset, color).await {
            Ok(true) => outcome,
            Ok(false) => PlaceOutcome::rejected(ReturnCode::Unknown),
            Err(e) => {
                log(format!("Could not store pixel {:?} on canvas {}: {}", coord, canvas_id, e), Error);
                PlaceOutcome::rejected(ReturnCode::Unknown)
            }
        }
    }

    /// Stores one unprotected cell and broadcasts it. Both happen under the
    /// chunk's stripe lock so watchers see changes in commit order.
    pub async fn commit_pixel(
        &self,
        canvas_id: CanvasId,
        chunk: ChunkCoord,
        offset: u32,
        color: u8,
    ) -> plaza_common::Result<bool> {
        let _guard = self.chunk_lock(canvas_id, chunk).lock().await;
        let stored = self
            .store()
            .set_pixel_in_chunk(chunk.i, chunk.j, offset, Cell::new(color, false), canvas_id)
            .await?;
        if stored {
            let packet = PixelUpdatePacket::new(chunk.i as u8, chunk.j as u8, offset, color);
            self.broadcast_pixel(canvas_id, packet);
        }
        Ok(stored)
    }
}
