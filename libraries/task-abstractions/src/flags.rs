bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct WaitOptions: u32 {
        // return immediately if no child has exited
        const NOHANG = 1;
    }
}
