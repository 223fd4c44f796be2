use crate::{
    canvas::Region,
    config::{
        HEIGHT,
        RENDER_CONCURRENCY,
        TILE,
        WIDTH,
    },
    error::TransportError,
    protocol::BoundaryConnection,
};
use futures::{
    StreamExt,
    stream,
};
use tracing::warn;

/// Fetch the whole canvas as one row-major buffer: a single-shot read
/// first, falling back to concurrent tiled reads when the full read fails
/// or comes back short.
pub async fn fetch_canvas<Conn: BoundaryConnection>(
    connection: &Conn,
) -> Result<Vec<u32>, TransportError> {
    let expected = (WIDTH * HEIGHT) as usize;
    match connection.read_region(Region::full()).await {
        Ok(colors) if colors.len() == expected => Ok(colors),
        Ok(colors) => {
            warn!(
                got = colors.len(),
                expected, "short canvas read, falling back to tiles"
            );
            fetch_canvas_tiled(connection).await
        }
        Err(error) => {
            warn!(%error, "single-shot canvas read failed, falling back to tiles");
            fetch_canvas_tiled(connection).await
        }
    }
}

/// Fan out one read per tile, at most `RENDER_CONCURRENCY` in flight, and
/// reassemble as the replies arrive. Tiles are independently idempotent and
/// ordering across them is irrelevant.
pub async fn fetch_canvas_tiled<Conn: BoundaryConnection>(
    connection: &Conn,
) -> Result<Vec<u32>, TransportError> {
    let mut tiles = Vec::new();
    for y in (0..HEIGHT).step_by(TILE as usize) {
        for x in (0..WIDTH).step_by(TILE as usize) {
            tiles.push(Region {
                x0: x,
                y0: y,
                x1: (x + TILE - 1).min(WIDTH - 1),
                y1: (y + TILE - 1).min(HEIGHT - 1),
            });
        }
    }

    let mut buffer = vec![0u32; (WIDTH * HEIGHT) as usize];
    let mut reads = stream::iter(tiles.into_iter().map(|tile| async move {
        let colors = connection.read_region(tile).await;
        (tile, colors)
    }))
    .buffer_unordered(RENDER_CONCURRENCY);

    while let Some((tile, colors)) = reads.next().await {
        let colors = colors?;
        let width = tile.width() as usize;
        for (row, chunk) in colors.chunks(width).enumerate() {
            let y = tile.y0 as usize + row;
            if y >= HEIGHT as usize {
                break;
            }
            let start = y * WIDTH as usize + tile.x0 as usize;
            let end = (start + chunk.len()).min(buffer.len());
            buffer[start..end].copy_from_slice(&chunk[..end - start]);
        }
    }
    Ok(buffer)
}
