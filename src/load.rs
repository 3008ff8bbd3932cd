use crate::geometry::DeviceDescriptor;
use crate::recovery::{RecoveryConfig, RecoveryOutcome};
use crate::{AnyhowResult, DataFlash, Error, Gpio, Result, SpiBus};

/// SPI clock polarity and phase.
#[derive(Copy, Clone, Debug, PartialEq, Eq, num_enum::IntoPrimitive)]
#[repr(u8)]
pub enum SpiMode {
    Mode0 = 0,
    Mode1 = 1,
    Mode2 = 2,
    Mode3 = 3,
}

/// Serial flash boot configuration.
#[derive(Copy, Clone, Debug)]
pub struct LoadConfig {
    pub spi_mode: SpiMode,
    pub clock_hz: u32,
    /// If true, image lengths are read from the image headers in flash
    /// instead of being taken from `ImageRegion::length`.
    pub dynamic_length: bool,
    /// Recovery button, if the board has one.
    pub recovery: Option<RecoveryConfig>,
}

impl Default for LoadConfig {
    fn default() -> Self {
        LoadConfig {
            spi_mode: SpiMode::Mode0,
            clock_hz: 33_000_000,
            dynamic_length: false,
            recovery: None,
        }
    }
}

/// Kind of image stored in the serial flash.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ImageKind {
    Kernel,
    DeviceTree,
}

impl core::fmt::Display for ImageKind {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self {
            ImageKind::Kernel => f.write_str("kernel"),
            ImageKind::DeviceTree => f.write_str("device tree"),
        }
    }
}

/// Trait for working out an image's total length from the start of the image.
///
/// `header` holds the first page of the image, or as much of it as fits
/// in the destination.
pub trait ImageInspector {
    fn image_size(&mut self, header: &[u8], kind: ImageKind) -> AnyhowResult<usize>;
}

impl<F> ImageInspector for F
where
    F: FnMut(&[u8], ImageKind) -> AnyhowResult<usize>,
{
    fn image_size(&mut self, header: &[u8], kind: ImageKind) -> AnyhowResult<usize> {
        self(header, kind)
    }
}

/// An image to copy out of the serial flash.
#[derive(Debug)]
pub struct ImageRegion<'a> {
    /// Byte offset of the image in the serial flash.
    pub offset: u32,
    /// Image length in bytes, updated when lengths are discovered dynamically.
    pub length: usize,
    pub dest: &'a mut [u8],
}

impl<'a> ImageRegion<'a> {
    pub fn new(offset: u32, length: usize, dest: &'a mut [u8]) -> Self {
        ImageRegion { offset, length, dest }
    }
}

/// Images to load: a kernel and an optional device tree blob.
#[derive(Debug)]
pub struct ImageInfo<'a> {
    pub kernel: ImageRegion<'a>,
    pub device_tree: Option<ImageRegion<'a>>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LoadOutcome {
    /// All requested images were copied.
    Loaded,
    /// The recovery erase ran, so no image was copied.
    Recovered,
}

/// Keeps the SPI controller enabled while alive, disabling it on drop.
struct EnabledBus<'a, B: SpiBus> {
    bus: &'a mut B,
}

impl<'a, B: SpiBus> EnabledBus<'a, B> {
    fn enable(bus: &'a mut B) -> Self {
        bus.enable();
        EnabledBus { bus }
    }
}

impl<'a, B: SpiBus> Drop for EnabledBus<'a, B> {
    fn drop(&mut self) {
        self.bus.disable();
    }
}

/// Load the images described by `image` from the serial flash on `bus`.
///
/// The bus is initialised and enabled, the flash probed, the recovery
/// erase run if requested, and then the kernel and optional device tree
/// copied. The bus is disabled again before returning, whatever the outcome.
pub fn load_dataflash<B, G, I>(
    bus: &mut B,
    gpio: &mut G,
    inspector: &mut I,
    config: &LoadConfig,
    image: &mut ImageInfo,
) -> Result<LoadOutcome>
where
    B: SpiBus,
    G: Gpio,
    I: ImageInspector,
{
    if let Err(err) = bus.init(config.spi_mode, config.clock_hz) {
        log::error!("Failed to initialise SPI");
        return Err(err.into());
    }

    let enabled = EnabledBus::enable(bus);
    let mut flash = DataFlash::new(&mut *enabled.bus);
    let result = load_images(&mut flash, gpio, inspector, config, image);
    if let Err(err) = &result {
        log::error!("Serial flash load failed: {:?}", err);
    }
    result
}

fn load_images<B, G, I>(
    flash: &mut DataFlash<B>,
    gpio: &mut G,
    inspector: &mut I,
    config: &LoadConfig,
    image: &mut ImageInfo,
) -> Result<LoadOutcome>
where
    B: SpiBus,
    G: Gpio,
    I: ImageInspector,
{
    let desc = flash.probe().map_err(|err| {
        log::error!("Failed to probe serial flash");
        err
    })?;

    if flash.maybe_recover(&desc, config.recovery.as_ref(), gpio)? == RecoveryOutcome::Recovered {
        log::info!("Boot image erased, not loading");
        return Ok(LoadOutcome::Recovered);
    }

    load_region(flash, &desc, inspector, config.dynamic_length, ImageKind::Kernel,
                &mut image.kernel)?;
    if let Some(device_tree) = image.device_tree.as_mut() {
        load_region(flash, &desc, inspector, config.dynamic_length, ImageKind::DeviceTree,
                    device_tree)?;
    }
    Ok(LoadOutcome::Loaded)
}

fn load_region<B, I>(
    flash: &mut DataFlash<B>,
    desc: &DeviceDescriptor,
    inspector: &mut I,
    dynamic_length: bool,
    kind: ImageKind,
    region: &mut ImageRegion,
) -> Result<()>
where
    B: SpiBus,
    I: ImageInspector,
{
    if dynamic_length {
        region.length = image_length(flash, desc, inspector, kind, region)?;
    }

    let capacity = region.dest.len();
    if region.length > capacity {
        log::error!("The {} image is {} bytes, destination holds {}",
                    kind, region.length, capacity);
        return Err(Error::ImageTooLarge { kind, length: region.length, capacity });
    }

    log::info!("Copy {} bytes of {} image from 0x{:08X}", region.length, kind, region.offset);
    flash.read_array(desc, region.offset, &mut region.dest[..region.length])
}

/// Read the first page of the image into its destination and ask `inspector` for its length.
fn image_length<B, I>(
    flash: &mut DataFlash<B>,
    desc: &DeviceDescriptor,
    inspector: &mut I,
    kind: ImageKind,
    region: &mut ImageRegion,
) -> Result<usize>
where
    B: SpiBus,
    I: ImageInspector,
{
    let header_len = usize::min(desc.page_size as usize, region.dest.len());
    let header = &mut region.dest[..header_len];
    flash.read_array(desc, region.offset, header)?;
    let length = inspector.image_size(header, kind).map_err(|err| image_length_error(kind, err))?;
    log::debug!("The {} image at 0x{:08X} is {} bytes", kind, region.offset, length);
    Ok(length)
}

#[cfg(feature = "std")]
fn image_length_error(kind: ImageKind, source: anyhow::Error) -> Error {
    log::error!("Could not determine the {} image length: {}", kind, source);
    Error::ImageLengthError { kind, source }
}
#[cfg(not(feature = "std"))]
fn image_length_error(kind: ImageKind, err: Error) -> Error {
    log::error!("Could not determine the {} image length: {:?}", kind, err);
    Error::ImageLengthError { kind }
}
