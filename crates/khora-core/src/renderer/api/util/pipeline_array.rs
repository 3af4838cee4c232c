// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! A fixed-size container with one slot per hardware pipeline.

use super::enums::RhiPipeline;
use std::ops::{Index, IndexMut};

/// Stores one `T` per [`RhiPipeline`], indexed by the pipeline itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineArray<T> {
    slots: [T; RhiPipeline::COUNT],
}

impl<T> PipelineArray<T> {
    /// Builds an array by calling `init` once per pipeline.
    pub fn from_fn(mut init: impl FnMut(RhiPipeline) -> T) -> Self {
        Self {
            slots: RhiPipeline::ALL.map(&mut init),
        }
    }

    /// Iterates over `(pipeline, value)` pairs in pipeline order.
    pub fn iter(&self) -> impl Iterator<Item = (RhiPipeline, &T)> {
        RhiPipeline::ALL.into_iter().zip(self.slots.iter())
    }

    /// Iterates mutably over `(pipeline, value)` pairs in pipeline order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (RhiPipeline, &mut T)> {
        RhiPipeline::ALL.into_iter().zip(self.slots.iter_mut())
    }
}

impl<T> Index<RhiPipeline> for PipelineArray<T> {
    type Output = T;

    fn index(&self, pipeline: RhiPipeline) -> &T {
        &self.slots[pipeline.index()]
    }
}

impl<T> IndexMut<RhiPipeline> for PipelineArray<T> {
    fn index_mut(&mut self, pipeline: RhiPipeline) -> &mut T {
        &mut self.slots[pipeline.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indexing_by_pipeline() {
        let mut array: PipelineArray<Option<u32>> = PipelineArray::default();
        array[RhiPipeline::AsyncCompute] = Some(7);

        assert_eq!(array[RhiPipeline::Graphics], None);
        assert_eq!(array[RhiPipeline::AsyncCompute], Some(7));
    }

    #[test]
    fn from_fn_visits_every_pipeline() {
        let array = PipelineArray::from_fn(|pipeline| pipeline.index() * 10);
        let collected: Vec<_> = array.iter().map(|(p, v)| (p, *v)).collect();
        assert_eq!(
            collected,
            vec![(RhiPipeline::Graphics, 0), (RhiPipeline::AsyncCompute, 10)]
        );
    }
}
