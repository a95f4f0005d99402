//! Generic stream SD host
//!
//! Provides an [`SdHost`] implementation wrapping any async I/O stream, so a
//! card image on disk can stand in for a real card.

use core::fmt;

use embedded_io_async::{Read, Seek, SeekFrom, Write};
use lfs_blockdev::{SD_BLOCK_SIZE, SdHost};

const SECTOR: usize = SD_BLOCK_SIZE as usize;

/// Errors reported by [`StreamCard`].
#[derive(Debug)]
pub enum StreamCardError<E> {
    /// The underlying stream failed.
    Io(E),
    /// The stream ended in the middle of a sector.
    UnexpectedEof,
    /// The stream stopped accepting data in the middle of a sector.
    WriteZero,
    /// The transfer runs past the last sector.
    OutOfRange {
        /// First sector of the transfer.
        block: u32,
        /// Number of sectors.
        count: u32,
    },
    /// The image holds more sectors than a 32-bit sector number can address.
    TooLarge,
}

impl<E: fmt::Debug> fmt::Display for StreamCardError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "Stream error: {:?}", e),
            Self::UnexpectedEof => write!(f, "Unexpected end of stream"),
            Self::WriteZero => write!(f, "Stream accepted no data"),
            Self::OutOfRange { block, count } => {
                write!(f, "Sectors {}..{} are past the end of the image", block, block + count)
            }
            Self::TooLarge => write!(f, "Image is too large"),
        }
    }
}

impl<E: fmt::Debug> std::error::Error for StreamCardError<E> {}

/// SD host over an async I/O stream
///
/// Wraps any type implementing `embedded_io_async::{Read, Write, Seek}`.
/// The sector count is taken from the stream length when the card is opened.
///
/// # Example
///
/// ```ignore
/// use lfs_blockdev_platform::StreamCard;
/// use embedded_io_adapters::tokio_1::FromTokio;
///
/// let file = tokio::fs::OpenOptions::new().read(true).write(true).open("card.img").await?;
/// let card = StreamCard::open(FromTokio::new(file)).await?;
/// ```
pub struct StreamCard<S> {
    stream: S,
    block_count: u32,
}

impl<S> StreamCard<S>
where
    S: Read + Write + Seek,
{
    /// Open a card image, sizing it from the stream length.
    pub async fn open(mut stream: S) -> Result<Self, StreamCardError<S::Error>> {
        let size = stream.seek(SeekFrom::End(0)).await.map_err(StreamCardError::Io)?;
        stream.seek(SeekFrom::Start(0)).await.map_err(StreamCardError::Io)?;

        let block_count = u32::try_from(size / SECTOR as u64).map_err(|_| StreamCardError::TooLarge)?;
        log::debug!("stream_card: {} bytes, {} sectors", size, block_count);

        Ok(Self { stream, block_count })
    }

    async fn seek_to(&mut self, block: u32, count: u32) -> Result<(), StreamCardError<S::Error>> {
        if block as u64 + count as u64 > self.block_count as u64 {
            return Err(StreamCardError::OutOfRange { block, count });
        }
        self.stream
            .seek(SeekFrom::Start(block as u64 * SECTOR as u64))
            .await
            .map_err(StreamCardError::Io)?;
        Ok(())
    }

    async fn write_sector(&mut self, sector: &[u8]) -> Result<(), StreamCardError<S::Error>> {
        let mut offset = 0;
        while offset < sector.len() {
            let n = self.stream.write(&sector[offset..]).await.map_err(StreamCardError::Io)?;
            if n == 0 {
                return Err(StreamCardError::WriteZero);
            }
            offset += n;
        }
        Ok(())
    }
}

impl<S> StreamCard<S> {
    /// Consume the card and return the stream.
    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S> SdHost for StreamCard<S>
where
    S: Read + Write + Seek,
{
    type Error = StreamCardError<S::Error>;

    fn block_count(&self) -> Result<u32, Self::Error> {
        Ok(self.block_count)
    }

    async fn read_blocks(&mut self, block: u32, buf: &mut [u8]) -> Result<(), Self::Error> {
        self.seek_to(block, (buf.len() / SECTOR) as u32).await?;
        for sector in buf.chunks_mut(SECTOR) {
            let mut offset = 0;
            while offset < sector.len() {
                let n = self.stream.read(&mut sector[offset..]).await.map_err(StreamCardError::Io)?;
                if n == 0 {
                    return Err(StreamCardError::UnexpectedEof);
                }
                offset += n;
            }
        }
        Ok(())
    }

    async fn write_blocks(&mut self, block: u32, data: &[u8]) -> Result<(), Self::Error> {
        self.seek_to(block, (data.len() / SECTOR) as u32).await?;
        for sector in data.chunks(SECTOR) {
            self.write_sector(sector).await?;
        }
        self.stream.flush().await.map_err(StreamCardError::Io)
    }

    async fn erase(&mut self, block: u32, count: u32) -> Result<(), Self::Error> {
        self.seek_to(block, count).await?;
        let zeros = [0u8; SECTOR];
        for _ in 0..count {
            self.write_sector(&zeros).await?;
        }
        self.stream.flush().await.map_err(StreamCardError::Io)
    }
}
