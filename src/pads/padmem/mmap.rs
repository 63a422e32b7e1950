use std::fmt;
use std::fs::OpenOptions;
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::ptr;

use libc::{self, c_void, size_t, MAP_FAILED, MAP_SHARED, O_SYNC, PROT_READ, PROT_WRITE};

use crate::pads::{Bias, Error, Result};

use super::{
    PadRegisters, PADS_BIAS_DOWN, PADS_BIAS_LSB, PADS_BIAS_MASK, PADS_BIAS_OFF, PADS_BIAS_UP,
    PADS_IN_ENABLE_MASK, PADS_OUT_DISABLE_MASK,
};

const PATH_DEV_GPIOMEM: &str = "/dev/gpiomem0";

// Each register contains 32 bits
const REG_SIZE: usize = std::mem::size_of::<u32>();
// The gpiomem window contains IO_BANK0-2, SYS_RIO0-2, PADS_BANK0-2, PADS_ETH
const MEM_SIZE: usize = 0x30000;

// The registry only manages bank 0, so IO_BANK0 and PADS_BANK0 are all
// we touch here.
const IO_BANK0_OFFSET: usize = 0x00000;
const PADS_BANK0_OFFSET: usize = 0x20000;

// Atomic register access (datasheet @ 2.4)
const RW_OFFSET: usize = 0x0000;
const SET_OFFSET: usize = 0x2000;
const CLR_OFFSET: usize = 0x3000;

// CTRL offset for the IO_BANK registers (datasheet @ 3.1.4)
const GPIO_CTRL: usize = 0x0004;
// Offset to the next GPIO for the IO_BANK registers (datasheet @ 3.1.4)
const GPIO_OFFSET: usize = 8;

const CTRL_FUNCSEL_MASK: u32 = 0x001f;
const CTRL_FUNCSEL_LSB: u32 = 0;
const CTRL_OUTOVER_MASK: u32 = 0x3000;
const CTRL_OUTOVER_LSB: u32 = 12;
const CTRL_OEOVER_MASK: u32 = 0xc000;
const CTRL_OEOVER_LSB: u32 = 14;

// Plain GPIO function select
const FSEL_GPIO: u32 = 5;

// Drive output and output enable from the peripheral signal selected
// by FUNCSEL
const OUTOVER_PERI: u32 = 0;
const OEOVER_PERI: u32 = 0;

// GPIO offset for the PADS_BANK registers (datasheet @ 3.1.4)
const PADS_GPIO: usize = 0x04;
// Offset to the next GPIO for the PADS_BANK registers (datasheet @ 3.1.4)
const PADS_OFFSET: usize = 4;

pub struct PadMem {
    mem_ptr: *mut u32,
}

impl fmt::Debug for PadMem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PadMem")
            .field("mem_ptr", &self.mem_ptr)
            .finish()
    }
}

impl PadMem {
    pub fn open() -> Result<PadMem> {
        let mem_ptr = Self::map_devgpiomem()?;

        Ok(PadMem { mem_ptr })
    }

    fn map_devgpiomem() -> Result<*mut u32> {
        // Open /dev/gpiomem0 with read/write/sync flags. This might fail if
        // /dev/gpiomem0 doesn't exist, or the current user doesn't have the
        // required permissions (typically fixed by adding the user to the
        // gpio group).
        let gpiomem_file = match OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(O_SYNC)
            .open(PATH_DEV_GPIOMEM)
        {
            Ok(file) => file,
            Err(ref e) if e.kind() == io::ErrorKind::PermissionDenied => {
                return Err(Error::PermissionDenied(String::from(PATH_DEV_GPIOMEM)));
            }
            Err(e) => return Err(Error::Io(e)),
        };

        // Memory-map /dev/gpiomem0 at offset 0
        let gpiomem_ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                MEM_SIZE,
                PROT_READ | PROT_WRITE,
                MAP_SHARED,
                gpiomem_file.as_raw_fd(),
                0,
            )
        };

        if gpiomem_ptr == MAP_FAILED {
            return Err(Error::Io(io::Error::last_os_error()));
        }

        Ok(gpiomem_ptr as *mut u32)
    }

    #[inline(always)]
    fn read(&self, offset: usize) -> u32 {
        unsafe { ptr::read_volatile(self.mem_ptr.add(offset)) }
    }

    #[inline(always)]
    fn write(&self, offset: usize, value: u32) {
        unsafe {
            ptr::write_volatile(self.mem_ptr.add(offset), value);
        }
    }

    #[inline(always)]
    fn pads_reg(&self, pin: u8, alias: usize) -> usize {
        (PADS_BANK0_OFFSET + PADS_GPIO + (pin as usize * PADS_OFFSET) + alias) / REG_SIZE
    }

    #[inline(always)]
    fn ctrl_reg(&self, pin: u8) -> usize {
        (IO_BANK0_OFFSET + GPIO_CTRL + (pin as usize * GPIO_OFFSET) + RW_OFFSET) / REG_SIZE
    }
}

impl PadRegisters for PadMem {
    fn reinit(&self, pin: u8) {
        let offset = self.ctrl_reg(pin);
        let mut reg_value = self.read(offset);

        reg_value = (reg_value & !CTRL_OUTOVER_MASK) | (OUTOVER_PERI << CTRL_OUTOVER_LSB);
        reg_value = (reg_value & !CTRL_OEOVER_MASK) | (OEOVER_PERI << CTRL_OEOVER_LSB);
        reg_value = (reg_value & !CTRL_FUNCSEL_MASK) | (FSEL_GPIO << CTRL_FUNCSEL_LSB);

        self.write(offset, reg_value);
    }

    #[inline(always)]
    fn disable_input(&self, pin: u8) {
        self.write(self.pads_reg(pin, CLR_OFFSET), PADS_IN_ENABLE_MASK);
    }

    #[inline(always)]
    fn disable_output(&self, pin: u8) {
        self.write(self.pads_reg(pin, SET_OFFSET), PADS_OUT_DISABLE_MASK);
    }

    fn set_bias(&self, pin: u8, bias: Bias) {
        let offset = self.pads_reg(pin, RW_OFFSET);
        let mut reg_value = self.read(offset);

        reg_value = match bias {
            Bias::Off => (reg_value & !PADS_BIAS_MASK) | (PADS_BIAS_OFF << PADS_BIAS_LSB),
            Bias::PullDown => (reg_value & !PADS_BIAS_MASK) | (PADS_BIAS_DOWN << PADS_BIAS_LSB),
            Bias::PullUp => (reg_value & !PADS_BIAS_MASK) | (PADS_BIAS_UP << PADS_BIAS_LSB),
        };

        self.write(offset, reg_value);
    }

    #[inline(always)]
    fn input_enabled(&self, pin: u8) -> bool {
        self.read(self.pads_reg(pin, RW_OFFSET)) & PADS_IN_ENABLE_MASK != 0
    }

    #[inline(always)]
    fn output_disabled(&self, pin: u8) -> bool {
        self.read(self.pads_reg(pin, RW_OFFSET)) & PADS_OUT_DISABLE_MASK != 0
    }
}

impl Drop for PadMem {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.mem_ptr as *mut c_void, MEM_SIZE as size_t);
        }
    }
}

// Required because of the raw pointer to our memory-mapped file
unsafe impl Send for PadMem {}

unsafe impl Sync for PadMem {}
