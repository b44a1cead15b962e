//! Host-side model of the cell grid
//!
//! Everything in here is plain data: grid dimensions and their uniform layout,
//! the two seed patterns, the toggle rule and the ping-pong parity that decides
//! which state buffer is read and which is written on a given step. The GPU
//! objects built from this live in [`gpucompute`].

use bytemuck::{Pod, Zeroable};

pub mod gpucompute;

/// Lanes per workgroup along each axis. Must match `@workgroup_size` in
/// `shader.wgsl`.
pub const WORKGROUP_SIZE: u32 = 8;

/// Size of the cell grid in cells
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GridDimensions {
    pub width: u32,
    pub height: u32,
}

impl GridDimensions {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub const fn square(size: u32) -> Self {
        Self::new(size, size)
    }

    pub const fn cell_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Byte size of one cell state buffer (one `u32` per cell)
    pub const fn state_buffer_size(&self) -> u64 {
        (self.cell_count() * std::mem::size_of::<u32>()) as u64
    }

    /// Workgroups to dispatch along x and y so every cell gets a lane
    pub const fn workgroups(&self) -> (u32, u32) {
        (
            self.width.div_ceil(WORKGROUP_SIZE),
            self.height.div_ceil(WORKGROUP_SIZE),
        )
    }

    pub fn uniform(&self) -> GridUniform {
        GridUniform {
            size: [self.width as f32, self.height as f32],
        }
    }
}

/// Grid size as the shaders see it: `var<uniform> grid: vec2f`
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct GridUniform {
    pub size: [f32; 2],
}

/// Initial contents of the two state buffers
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Seed {
    /// Every third cell alive, starting at cell 0
    EveryThird,
    /// Odd cells alive
    Alternating,
}

impl Seed {
    pub fn cells(self, count: usize) -> Vec<u32> {
        match self {
            Seed::EveryThird => (0..count).map(|i| (i % 3 == 0) as u32).collect(),
            Seed::Alternating => (0..count).map(|i| (i % 2) as u32).collect(),
        }
    }
}

/// The per-cell update rule. This is a plain toggle, not a neighbor count:
/// exactly `1` becomes `0`, every other value becomes `1`.
pub const fn toggle(state: u32) -> u32 {
    if state == 1 { 0 } else { 1 }
}

/// State buffer read as compute input on `step`
pub const fn input_slot(step: u64) -> usize {
    (step % 2) as usize
}

/// State buffer written as compute output on `step`
pub const fn output_slot(step: u64) -> usize {
    ((step + 1) % 2) as usize
}

/// What a single tick records into its command buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TickPlan {
    /// Step counter value before the tick
    pub step: u64,
    /// Bind group used by the compute pass
    pub compute_group: usize,
    /// Bind group used by the render pass. Chosen after the step counter
    /// is incremented, so it is always the other group.
    pub render_group: usize,
    pub workgroups: (u32, u32),
    pub vertex_count: u32,
    pub instance_count: u32,
}

impl TickPlan {
    pub fn new(step: u64, grid: GridDimensions) -> Self {
        let next = step + 1;
        Self {
            step,
            compute_group: input_slot(step),
            render_group: input_slot(next),
            workgroups: grid.workgroups(),
            vertex_count: crate::rendering::QUAD_VERTICES.len() as u32,
            instance_count: grid.cell_count() as u32,
        }
    }
}

/// CPU mirror of the GPU ping-pong: same seeds, same rule, same parity.
#[derive(Clone, Debug)]
pub struct CpuLife {
    grid: GridDimensions,
    cells: [Vec<u32>; 2],
    step: u64,
}

impl CpuLife {
    pub fn new(grid: GridDimensions) -> Self {
        let count = grid.cell_count();
        Self::from_cells(
            grid,
            [Seed::EveryThird.cells(count), Seed::Alternating.cells(count)],
        )
    }

    pub fn from_cells(grid: GridDimensions, cells: [Vec<u32>; 2]) -> Self {
        debug_assert!(cells.iter().all(|c| c.len() == grid.cell_count()));
        Self {
            grid,
            cells,
            step: 0,
        }
    }

    pub fn tick(&mut self) -> TickPlan {
        let plan = TickPlan::new(self.step, self.grid);
        let [a, b] = &mut self.cells;
        let (input, output) = if plan.compute_group == 0 {
            (&*a, b)
        } else {
            (&*b, a)
        };
        for (out, cell) in output.iter_mut().zip(input) {
            *out = toggle(*cell);
        }
        self.step += 1;
        plan
    }

    /// The buffer the render pass of the latest tick reads
    pub fn rendered(&self) -> &[u32] {
        &self.cells[input_slot(self.step)]
    }

    pub fn slot(&self, index: usize) -> &[u32] {
        &self.cells[index]
    }

    pub fn step(&self) -> u64 {
        self.step
    }
}

#[cfg(test)]
mod tests {
    use quickcheck_macros::quickcheck;

    use super::*;

    const GRID: GridDimensions = GridDimensions::square(32);

    #[test]
    fn seeds_are_deterministic() {
        let a = Seed::EveryThird.cells(GRID.cell_count());
        let b = Seed::Alternating.cells(GRID.cell_count());
        assert_eq!(a.len(), 1024);
        assert_eq!(b.len(), 1024);
        for i in 0..1024 {
            assert_eq!(a[i] == 1, i % 3 == 0, "seed A at {i}");
            assert_eq!(b[i], (i % 2) as u32, "seed B at {i}");
        }
    }

    #[test]
    fn toggle_is_not_a_neighbor_rule() {
        assert_eq!(toggle(1), 0);
        assert_eq!(toggle(0), 1);
        // only an exact 1 counts as alive
        assert_eq!(toggle(2), 1);
        assert_eq!(toggle(u32::MAX), 1);
    }

    #[quickcheck]
    fn toggle_complements_binary_states(alive: bool) -> bool {
        let state = alive as u32;
        toggle(state) == 1 - state
    }

    #[quickcheck]
    fn roles_invert_between_ticks(step: u32) -> bool {
        let step = step as u64;
        input_slot(step) != output_slot(step)
            && input_slot(step + 1) == output_slot(step)
            && output_slot(step + 1) == input_slot(step)
    }

    #[test]
    fn grid_layout_sizes() {
        assert_eq!(GRID.state_buffer_size(), 4096);
        assert_eq!(std::mem::size_of::<GridUniform>(), 8);
        assert_eq!(GRID.uniform().size, [32.0, 32.0]);
    }

    #[test]
    fn workgroups_round_up() {
        assert_eq!(GRID.workgroups(), (4, 4));
        assert_eq!(GridDimensions::new(33, 7).workgroups(), (5, 1));
    }

    #[test]
    fn tick_plan_is_constant_apart_from_parity() {
        for step in 0..8 {
            let plan = TickPlan::new(step, GRID);
            assert_eq!(plan.workgroups, (4, 4));
            assert_eq!(plan.instance_count, 1024);
            assert_eq!(plan.vertex_count, 6);
            assert_eq!(plan.compute_group, (step % 2) as usize);
        }
    }

    #[test]
    fn render_binds_post_increment_group() {
        let plan = TickPlan::new(0, GRID);
        assert_eq!(plan.compute_group, 0);
        assert_eq!(plan.render_group, 1);
        let plan = TickPlan::new(1, GRID);
        assert_eq!(plan.compute_group, 1);
        assert_eq!(plan.render_group, 0);
        // the render group's input binding is the buffer compute just wrote
        for step in 0..4 {
            let plan = TickPlan::new(step, GRID);
            assert_eq!(plan.render_group, output_slot(step));
        }
    }

    #[test]
    fn cpu_tick_writes_complement_of_input() {
        let mut life = CpuLife::new(GRID);
        let seed_a = life.slot(0).to_vec();
        life.tick();
        assert_eq!(life.slot(0), &seed_a[..], "input must be untouched");
        for (i, (out, input)) in life.slot(1).iter().zip(&seed_a).enumerate() {
            assert_eq!(*out, 1 - *input, "cell {i}");
        }
    }

    #[test]
    fn three_ticks_toggle_cell_zero_three_times() {
        let mut life = CpuLife::new(GRID);
        for _ in 0..3 {
            life.tick();
        }
        assert_eq!(life.step(), 3);
        assert_eq!(life.rendered()[0], toggle(toggle(toggle(1))));
        assert_eq!(life.rendered()[0], 0);
        // cell 1 starts dead in seed A
        assert_eq!(life.rendered()[1], 1);
    }
}
