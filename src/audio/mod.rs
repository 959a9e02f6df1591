pub mod archive;
pub mod backend;
pub mod capture;
pub mod device;
pub mod file;
pub mod recording;
pub mod synthetic;

pub use archive::RecordingArchive;
pub use backend::{
    AudioBackendFactory, AudioFormat, AudioSource, CaptureConfig, CaptureDevice, CaptureSource,
    ChunkRead,
};
pub use capture::AudioCapture;
pub use device::DefaultDeviceSource;
pub use file::FileSource;
pub use recording::Recording;
pub use synthetic::SyntheticSource;
