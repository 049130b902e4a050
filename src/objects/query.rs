use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::handle::NativeHandle;
use crate::registry::{DeviceObject, Objects};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum QueryKind {
    #[default]
    Occlusion,
    Timestamp,
    PipelineStatistics,
}

#[derive(Clone, Debug, Default)]
pub struct QueryCreateInfo {
    pub kind: QueryKind,
    pub count: u32,
}

/// A pool of `count` queries of one kind.
pub struct Query {
    native: NativeHandle,
    pub kind: QueryKind,
    pub count: u32,
}

impl DeviceObject for Query {
    type CreateInfo = QueryCreateInfo;

    fn allocate(info: &QueryCreateInfo, _objects: &Objects, backend: &mut dyn Backend) -> Result<Self> {
        if info.count == 0 {
            return Err(Error::InvalidArgument("query count must be non-zero".into()));
        }
        Ok(Self {
            native: backend.allocate_query(info)?,
            kind: info.kind,
            count: info.count,
        })
    }

    fn native(&self) -> NativeHandle {
        self.native
    }
}
