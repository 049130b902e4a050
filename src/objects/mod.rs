// Resource kinds managed by the Device registry
//
// Each kind is a small record of what the engine needs to know about the
// object plus its native handle, and a create-info struct consumed once at
// creation time.

mod buffer;
mod command;
mod descriptor;
mod image;
mod pipeline;
mod query;
mod queue;
mod render_pass;
mod sampler;
mod surface;
mod swapchain;
mod sync;

pub use buffer::*;
pub use command::*;
pub use descriptor::*;
pub use image::*;
pub use pipeline::*;
pub use query::*;
pub use queue::*;
pub use render_pass::*;
pub use sampler::*;
pub use surface::*;
pub use swapchain::*;
pub use sync::*;
