//! Bring-up and teardown
//!
//! ```text
//! Uninitialized ─► Enabling ─► MasterDisabling ─► Resetting ─► Configuring
//!       ▲                                                          │
//!       │                                                          ▼
//!       └──────────── ShuttingDown ◄──────── Running ◄──── BuffersAllocated
//! ```
//!
//! Every resource is recorded the moment it is acquired, so teardown can run
//! from any point of a failed bring-up and release exactly what is held.

use log::{debug, error, info};

use super::descriptor::DESC_SIZE;
use super::filter;
use super::regs::*;
use super::{DeviceState, Edrv};
use crate::drivers::net::netdev::{EdrvError, TimeoutKind};
use crate::hal::{PciFunction, RegisterIo};
use crate::net::ethernet::MacAddress;

/// Poll `offset` every millisecond until `done` holds, at most `tries` reads
fn poll<R, P>(regs: &R, platform: &P, offset: usize, tries: u32, done: impl Fn(u32) -> bool) -> bool
where
    R: RegisterIo + ?Sized,
    P: PciFunction,
{
    for _ in 0..tries {
        if done(regs.read(offset)) {
            return true;
        }
        platform.delay_ms(1);
    }
    false
}

/// Write a 64-bit bus address to a low/high register pair
fn write_bus_addr<R: RegisterIo + ?Sized>(regs: &R, low: usize, high: usize, addr: u64) {
    regs.write(low, addr as u32);
    regs.write(high, (addr >> 32) as u32);
}

impl<'cb, P: PciFunction> Edrv<'cb, P> {
    /// Bring the controller up
    ///
    /// Returns the effective station address. On any failure everything
    /// acquired so far is released and the device is back in
    /// `Uninitialized`. Calling `init` on a device that is not
    /// `Uninitialized` fails with `AlreadyInitialized` and changes nothing.
    pub fn init(&mut self) -> Result<MacAddress, EdrvError> {
        if self.state != DeviceState::Uninitialized {
            return Err(EdrvError::AlreadyInitialized);
        }

        match self.bring_up() {
            Ok(()) => {
                info!("e82573: running, station address {}", self.mac_address);
                Ok(self.mac_address)
            }
            Err(err) => {
                error!("e82573: bring-up failed during {:?}: {}", self.state, err);
                self.teardown();
                Err(err)
            }
        }
    }

    /// Stop the controller and release every resource
    ///
    /// Safe to call in any state and more than once.
    pub fn shutdown(&mut self) {
        if self.state == DeviceState::Uninitialized {
            return;
        }
        self.teardown();
        info!("e82573: shut down");
    }

    fn bring_up(&mut self) -> Result<(), EdrvError> {
        // Bus access
        self.set_state(DeviceState::Enabling);
        self.platform.enable_device()?;
        self.device_enabled = true;
        self.platform.request_regions()?;
        self.regions_requested = true;
        self.regs = Some(self.platform.map_registers()?);
        self.platform.set_bus_master();

        self.set_state(DeviceState::MasterDisabling);
        self.disable_master()?;

        self.set_state(DeviceState::Resetting);
        self.reset()?;

        self.set_state(DeviceState::Configuring);
        self.configure()?;

        self.set_state(DeviceState::BuffersAllocated);
        self.allocate_regions()?;
        self.program_rings()?;

        self.platform.request_irq()?;
        self.irq_registered = true;

        self.registers()?.write(IMS, INT_MASK_DEF);
        self.set_state(DeviceState::Running);
        Ok(())
    }

    /// Stop bus mastering so reset cannot cut a DMA transaction
    fn disable_master(&self) -> Result<(), EdrvError> {
        let Some(regs) = self.regs.as_ref() else {
            return Err(EdrvError::NotInitialized);
        };
        regs.set_bits(CTRL, CTRL_MST_DIS);
        let stopped = poll(
            regs,
            &self.platform,
            STATUS,
            self.config.master_disable_timeout_ms,
            |status| status & STATUS_MST_EN == 0,
        );
        if !stopped {
            return Err(EdrvError::Timeout(TimeoutKind::MasterDisable));
        }
        regs.write(IMC, INT_MASK_ALL);
        Ok(())
    }

    /// Global reset, then wait for the EEPROM reload
    fn reset(&self) -> Result<(), EdrvError> {
        let Some(regs) = self.regs.as_ref() else {
            return Err(EdrvError::NotInitialized);
        };
        regs.set_bits(CTRL, CTRL_RST);
        let loaded = poll(
            regs,
            &self.platform,
            EEC,
            self.config.auto_read_timeout_ms,
            |eec| eec & EEC_AUTO_RD != 0,
        );
        if !loaded {
            return Err(EdrvError::Timeout(TimeoutKind::AutoRead));
        }
        Ok(())
    }

    fn configure(&mut self) -> Result<(), EdrvError> {
        let Some(regs) = self.regs.as_ref() else {
            return Err(EdrvError::NotInitialized);
        };

        // Reset re-enables nothing, but clear anything latched before it
        regs.write(IMC, INT_MASK_ALL);
        let _ = regs.read(ICR);

        regs.write(CTRL, CTRL_DEF);
        regs.write(TIPG, TIPG_DEF);
        regs.write(RXDCTL, RXDCTL_DEF);
        regs.write(TXDCTL, TXDCTL_DEF);

        for i in 0..MTA_WORDS {
            regs.write(mta(i), 0);
        }

        if self.config.mac_address.is_zero() {
            // Loaded from the EEPROM by the reset above
            let (low, high) = (regs.read(ral(0)), regs.read(rah(0)));
            self.mac_address = filter::join(low, high);
            debug!("e82573: burned-in address {}", self.mac_address);
        } else {
            regs.write(rah(0), 0);
            filter::write_entry(regs, 0, &self.config.mac_address);
            self.mac_address = self.config.mac_address;
        }
        Ok(())
    }

    fn allocate_regions(&mut self) -> Result<(), EdrvError> {
        self.tx_buffers = Some(self.platform.alloc_coherent(TX_BUFFERS_SIZE)?);
        self.tx_descs = Some(self.platform.alloc_coherent(TX_DESCS * DESC_SIZE)?);
        self.rx_buffers = Some(self.platform.alloc_coherent(RX_BUFFERS_SIZE)?);
        self.rx_descs = Some(self.platform.alloc_coherent(RX_DESCS * DESC_SIZE)?);
        debug!("e82573: DMA regions allocated");
        Ok(())
    }

    fn program_rings(&mut self) -> Result<(), EdrvError> {
        let (Some(regs), Some(tx_descs), Some(rx_buffers), Some(rx_descs)) = (
            self.regs.as_ref(),
            self.tx_descs.as_ref(),
            self.rx_buffers.as_ref(),
            self.rx_descs.as_ref(),
        ) else {
            return Err(EdrvError::NotInitialized);
        };

        // Receive
        self.rx_ring.post_all(rx_descs, rx_buffers);
        write_bus_addr(regs, RDBAL0, RDBAH0, rx_descs.bus_addr());
        regs.write(RDLEN0, (RX_DESCS * DESC_SIZE) as u32);
        regs.write(RDH0, 0);
        regs.write(RDT0, (RX_DESCS - 1) as u32);
        regs.write(RCTL, RCTL_DEF);

        // Transmit
        self.tx_ring.reset();
        tx_descs.clear();
        write_bus_addr(regs, TDBAL, TDBAH, tx_descs.bus_addr());
        regs.write(TDLEN, (TX_DESCS * DESC_SIZE) as u32);
        regs.write(TDH, 0);
        regs.write(TDT, 0);
        regs.write(TCTL, TCTL_DEF);
        Ok(())
    }

    /// Release whatever is held, in reverse order of acquisition
    pub(super) fn teardown(&mut self) {
        self.set_state(DeviceState::ShuttingDown);

        if let Some(regs) = self.regs.as_ref() {
            regs.write(TCTL, 0);
            regs.write(RCTL, 0);
            regs.write(IMC, INT_MASK_ALL);
            let _ = regs.read(ICR);
        }

        if self.irq_registered {
            self.platform.free_irq();
            self.irq_registered = false;
        }

        let regions = [
            self.tx_buffers.take(),
            self.tx_descs.take(),
            self.rx_buffers.take(),
            self.rx_descs.take(),
        ];
        for region in regions.into_iter().flatten() {
            self.platform.free_coherent(region);
        }
        self.tx_pool.clear();
        self.tx_ring.reset();
        self.rx_ring.reset();

        if let Some(regs) = self.regs.take() {
            self.platform.unmap_registers(regs);
        }
        if self.device_enabled {
            self.platform.disable_device();
            self.device_enabled = false;
        }
        if self.regions_requested {
            self.platform.release_regions();
            self.regions_requested = false;
        }

        self.set_state(DeviceState::Uninitialized);
    }
}

#[cfg(test)]
mod tests {
    use super::super::sim::{BURNED_IN_MAC, Event, FailAt, Sim};
    use super::super::EdrvConfig;
    use super::*;
    use crate::drivers::net::netdev::{ErrorClass, RxBuffer, RxHandler};
    use crate::hal::PlatformError;

    struct Nop;
    impl RxHandler for Nop {
        fn on_receive(&self, _frame: &RxBuffer<'_>) {}
    }

    fn assert_nothing_held(sim: &Sim) {
        assert_eq!(sim.held(), (false, false, false, false, 0));
    }

    #[test]
    fn test_init_sequence() {
        let sim = Sim::new();
        let mut edrv = Edrv::new(sim.platform(), EdrvConfig::new(&Nop));

        assert_eq!(edrv.init(), Ok(BURNED_IN_MAC));
        assert_eq!(edrv.state(), DeviceState::Running);
        assert_eq!(edrv.mac_address(), BURNED_IN_MAC);
        assert_eq!(sim.held(), (true, true, true, true, 4));

        let events = sim.events();
        assert_eq!(
            events[..4],
            [Event::Enable, Event::RequestRegions, Event::Map, Event::BusMaster]
        );
        assert_eq!(events.last(), Some(&Event::RequestIrq));

        // Master disable requested before reset, both before configuration
        let writes = sim.writes();
        let ctrl = |bits: u32| {
            writes
                .iter()
                .position(|&(off, v)| off == CTRL && v & bits != 0)
                .unwrap()
        };
        let pos = |entry: (usize, u32)| writes.iter().position(|&w| w == entry).unwrap();
        assert!(ctrl(CTRL_MST_DIS) < ctrl(CTRL_RST));
        assert!(ctrl(CTRL_RST) < pos((CTRL, CTRL_DEF)));
        assert!(pos((TCTL, TCTL_DEF)) < pos((IMS, INT_MASK_DEF)));

        assert_eq!(sim.reg(TIPG), TIPG_DEF);
        assert_eq!(sim.reg(RCTL), RCTL_DEF);
        assert_eq!(sim.reg(TCTL), TCTL_DEF);
        assert_eq!(sim.reg(RDLEN0), 256);
        assert_eq!(sim.reg(TDLEN), 256);
        assert_eq!(sim.reg(RDH0), 0);
        assert_eq!(sim.reg(RDT0), 15);
        assert_eq!(sim.reg(IMS), INT_MASK_DEF);
        assert!((0..MTA_WORDS).all(|i| writes.contains(&(mta(i), 0))));

        // Receive descriptors point at disjoint 2 KiB buffers
        let (first, _) = sim.rx_desc(0);
        let (second, _) = sim.rx_desc(1);
        assert_eq!(second - first, RX_BUFFER_PER_DESC as u64);
    }

    #[test]
    fn test_configured_station_address() {
        let sim = Sim::new();
        let mac = MacAddress::new([0x02, 0x00, 0x00, 0x00, 0x00, 0xF0]);
        let config = EdrvConfig::new(&Nop).with_mac_address(mac);
        let mut edrv = Edrv::new(sim.platform(), config);

        assert_eq!(edrv.init(), Ok(mac));
        assert_eq!(sim.reg(ral(0)), 0x0000_0002);
        assert_eq!(sim.reg(rah(0)), 0xF000 | RAH_AV);
        // Entry disabled before it is rewritten
        let writes = sim.writes();
        let disable = writes.iter().position(|&w| w == (rah(0), 0)).unwrap();
        let low = writes.iter().position(|&w| w == (ral(0), 2)).unwrap();
        assert!(disable < low);
    }

    #[test]
    fn test_init_twice() {
        let sim = Sim::new();
        let mut edrv = Edrv::new(sim.platform(), EdrvConfig::new(&Nop));
        edrv.init().unwrap();
        let events = sim.events().len();

        assert_eq!(edrv.init(), Err(EdrvError::AlreadyInitialized));
        assert_eq!(edrv.state(), DeviceState::Running);
        assert_eq!(sim.events().len(), events);
    }

    #[test]
    fn test_master_disable_timeout() {
        let sim = Sim::new();
        sim.stick_master_enable();
        let mut edrv = Edrv::new(sim.platform(), EdrvConfig::new(&Nop));

        let err = edrv.init().unwrap_err();
        assert_eq!(err, EdrvError::Timeout(TimeoutKind::MasterDisable));
        assert_eq!(err.class(), ErrorClass::Timing);
        assert_eq!(sim.delays(), 90);
        assert!(!sim.writes().iter().any(|&(off, v)| off == CTRL && v & CTRL_RST != 0));
        assert_eq!(edrv.state(), DeviceState::Uninitialized);
        assert_nothing_held(&sim);
    }

    #[test]
    fn test_auto_read_timeout() {
        let sim = Sim::new();
        sim.stick_auto_read();
        let config = EdrvConfig::new(&Nop).with_timeouts(5, 3);
        let mut edrv = Edrv::new(sim.platform(), config);

        assert_eq!(edrv.init(), Err(EdrvError::Timeout(TimeoutKind::AutoRead)));
        assert_eq!(sim.delays(), 3);
        assert_nothing_held(&sim);
    }

    #[test]
    fn test_failure_at_every_step_releases_everything() {
        let steps = [
            (FailAt::Enable, PlatformError::EnableFailed),
            (FailAt::Regions, PlatformError::RegionsBusy),
            (FailAt::Map, PlatformError::MapFailed),
            (FailAt::Alloc(0), PlatformError::OutOfDmaMemory),
            (FailAt::Alloc(1), PlatformError::OutOfDmaMemory),
            (FailAt::Alloc(2), PlatformError::OutOfDmaMemory),
            (FailAt::Alloc(3), PlatformError::OutOfDmaMemory),
            (FailAt::Irq, PlatformError::IrqUnavailable),
        ];

        for (step, expected) in steps {
            let sim = Sim::new();
            sim.fail_at(step);
            let mut edrv = Edrv::new(sim.platform(), EdrvConfig::new(&Nop));

            let err = edrv.init().unwrap_err();
            assert_eq!(err, EdrvError::Resource(expected), "{:?}", step);
            assert_eq!(err.class(), ErrorClass::Resource);
            assert_eq!(edrv.state(), DeviceState::Uninitialized);
            assert_nothing_held(&sim);

            // Every acquire has exactly one matching release
            let events = sim.events();
            let count = |e: Event| events.iter().filter(|&&x| x == e).count();
            assert_eq!(count(Event::Enable), count(Event::Disable), "{:?}", step);
            assert_eq!(count(Event::RequestRegions), count(Event::ReleaseRegions));
            assert_eq!(count(Event::Map), count(Event::Unmap));
            assert_eq!(count(Event::RequestIrq), count(Event::FreeIrq));
            for e in &events {
                if let Event::Alloc(bus) = *e {
                    assert_eq!(count(Event::Free(bus)), 1);
                }
            }

            // Nothing left to do on a second teardown
            edrv.shutdown();
            assert_eq!(sim.events(), events);
        }
    }

    #[test]
    fn test_shutdown_order_and_idempotence() {
        let sim = Sim::new();
        let mut edrv = Edrv::new(sim.platform(), EdrvConfig::new(&Nop));
        edrv.init().unwrap();
        let before = sim.events().len();
        sim.clear_writes();

        edrv.shutdown();
        assert_eq!(edrv.state(), DeviceState::Uninitialized);
        assert_nothing_held(&sim);

        let writes = sim.writes();
        assert_eq!(writes[0], (TCTL, 0));
        assert!(writes.contains(&(IMC, INT_MASK_ALL)));

        let events = sim.events();
        let tail: std::vec::Vec<_> = events[before..]
            .iter()
            .map(|e| match e {
                Event::Free(_) => Event::Free(0),
                other => *other,
            })
            .collect();
        assert_eq!(
            tail,
            [
                Event::FreeIrq,
                Event::Free(0),
                Event::Free(0),
                Event::Free(0),
                Event::Free(0),
                Event::Unmap,
                Event::Disable,
                Event::ReleaseRegions,
            ]
        );

        edrv.shutdown();
        assert_eq!(sim.events(), events);
    }

    #[test]
    fn test_reinit_after_shutdown() {
        let sim = Sim::new();
        let mut edrv = Edrv::new(sim.platform(), EdrvConfig::new(&Nop));
        edrv.init().unwrap();
        edrv.shutdown();
        assert_eq!(edrv.init(), Ok(BURNED_IN_MAC));
        assert_eq!(edrv.state(), DeviceState::Running);
        assert_eq!(sim.held(), (true, true, true, true, 4));
    }

    #[test]
    fn test_drop_releases_resources() {
        let sim = Sim::new();
        {
            let mut edrv = Edrv::new(sim.platform(), EdrvConfig::new(&Nop));
            edrv.init().unwrap();
        }
        assert_nothing_held(&sim);
    }
}
