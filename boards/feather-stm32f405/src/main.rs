#![deny(unsafe_code)]
#![deny(warnings)]
#![no_main]
#![no_std]

use defmt_rtt as _; // global logger
use panic_probe as _;
use rtic::app;
use rtic_monotonics::stm32::prelude::*;

mod bus;
mod ccmram;
mod clock;
mod network;
mod settings;

stm32_tim2_monotonic!(Mono, 1_000_000);

#[app(device = embassy_stm32, peripherals = true, dispatchers = [USART1, USART2, USART3])]
mod app {
    use super::*;
    use defmt::{error, info};
    use embassy_futures::join::join3;
    use embassy_net::udp::{PacketMetadata, UdpSocket};
    use embassy_stm32::exti::ExtiInput;
    use embassy_stm32::gpio::{Input, Level, Output, Pull, Speed};
    use embassy_stm32::peripherals;
    use embassy_stm32::rcc::{Hse, HseMode, LsConfig, LseConfig, LseMode};
    use embassy_stm32::rng::Rng;
    use embassy_stm32::rtc::{Rtc, RtcConfig as HwRtcConfig};
    use embassy_stm32::spi::{self, Spi};
    use embassy_stm32::time::Hertz;
    use rtcemul_core::{ntp, Dispatcher, RtcEngine, RtcType, WINDOW_LEN};
    use static_cell::{ConstStaticCell, StaticCell};

    use crate::bus::BusPins;
    use crate::ccmram::{FRAME_SLOT, PROBE_QUEUE};
    use crate::clock::{BoardRtc, MonoClock};
    use crate::network::{manager, EmbassyLink, NetworkConfig, UdpConfig};

    type SpiPeripheral = embassy_stm32::Peri<'static, peripherals::SPI2>;
    type PinPB13 = embassy_stm32::Peri<'static, peripherals::PB13>;
    type PinPB15 = embassy_stm32::Peri<'static, peripherals::PB15>;
    type PinPB14 = embassy_stm32::Peri<'static, peripherals::PB14>;
    type PinPC6 = embassy_stm32::Peri<'static, peripherals::PC6>;
    type PinPC3 = embassy_stm32::Peri<'static, peripherals::PC3>;
    type PinPC2 = embassy_stm32::Peri<'static, peripherals::PC2>;
    type ExtiChannel = embassy_stm32::Peri<'static, peripherals::EXTI2>;
    type DmaTx = embassy_stm32::Peri<'static, peripherals::DMA1_CH4>;
    type DmaRx = embassy_stm32::Peri<'static, peripherals::DMA1_CH3>;
    type RngPeripheral = embassy_stm32::Peri<'static, peripherals::RNG>;

    type Engine = RtcEngine<'static, BoardRtc, Rng<'static, peripherals::RNG>>;

    struct NetworkPeripherals {
        spi: SpiPeripheral,
        sck: PinPB13,
        mosi: PinPB15,
        miso: PinPB14,
        cs: PinPC6,
        reset: PinPC3,
        int: PinPC2,
        exti: ExtiChannel,
        dma_tx: DmaTx,
        dma_rx: DmaRx,
    }

    // RNG interrupt binding for hardware random number generator
    embassy_stm32::bind_interrupts!(struct RngIrqs {
        RNG => embassy_stm32::rng::InterruptHandler<peripherals::RNG>;
    });

    #[shared]
    struct Shared {}

    #[local]
    struct Local {
        bus: BusPins,
    }

    #[init]
    fn init(_cx: init::Context) -> (Shared, Local) {
        info!("Cartridge RTC emulator starting...");

        // Adafruit Feather STM32F405: 12 MHz HSE, 32.768 kHz LSE (PC14/PC15)
        let mut config = embassy_stm32::Config::default();
        config.rcc.hse = Some(Hse {
            freq: Hertz(12_000_000),
            mode: HseMode::Oscillator,
        });

        // HSE (12 MHz) / 6 = 2 MHz PLL input, x168 = 336 MHz VCO
        // SYSCLK = VCO / 4 = 84 MHz, PLLQ = VCO / 7 = 48 MHz (RNG)
        config.rcc.pll_src = embassy_stm32::rcc::PllSource::HSE;
        config.rcc.pll = Some(embassy_stm32::rcc::Pll {
            prediv: embassy_stm32::rcc::PllPreDiv::DIV6,
            mul: embassy_stm32::rcc::PllMul::MUL168,
            divp: Some(embassy_stm32::rcc::PllPDiv::DIV4),
            divq: Some(embassy_stm32::rcc::PllQDiv::DIV7),
            divr: None,
        });
        config.rcc.sys = embassy_stm32::rcc::Sysclk::PLL1_P;
        config.rcc.ahb_pre = embassy_stm32::rcc::AHBPrescaler::DIV1; // 84 MHz
        config.rcc.apb1_pre = embassy_stm32::rcc::APBPrescaler::DIV2; // 42 MHz
        config.rcc.apb2_pre = embassy_stm32::rcc::APBPrescaler::DIV1; // 84 MHz

        config.rcc.ls = LsConfig {
            rtc: embassy_stm32::rcc::RtcClockSource::LSE,
            lsi: false,
            lse: Some(LseConfig {
                frequency: Hertz(32_768),
                mode: LseMode::Oscillator(embassy_stm32::rcc::LseDrive::MediumHigh),
            }),
        };

        let p = embassy_stm32::init(config);

        // TIM2 on APB1: timer clock = 2 * APB1 = 84 MHz
        Mono::start(84_000_000);

        let rtc = BoardRtc::new(Rtc::new(p.RTC, HwRtcConfig::default()));
        info!("Internal RTC initialized with LSE");

        let bus = BusPins {
            strobe: ExtiInput::new(p.PC8, p.EXTI8, Pull::Up),
            _address: [
                Input::new(p.PA0, Pull::None),
                Input::new(p.PA1, Pull::None),
                Input::new(p.PA2, Pull::None),
                Input::new(p.PA3, Pull::None),
                Input::new(p.PA4, Pull::None),
                Input::new(p.PA5, Pull::None),
                Input::new(p.PA6, Pull::None),
                Input::new(p.PA7, Pull::None),
                Input::new(p.PB0, Pull::None),
                Input::new(p.PB1, Pull::None),
                Input::new(p.PB2, Pull::None),
                Input::new(p.PB3, Pull::None),
                Input::new(p.PB4, Pull::None),
                Input::new(p.PB5, Pull::None),
                Input::new(p.PB6, Pull::None),
                Input::new(p.PB7, Pull::None),
            ],
            _rom4: Input::new(p.PC7, Pull::Up),
        };

        let net_periph = NetworkPeripherals {
            spi: p.SPI2,
            sck: p.PB13,
            mosi: p.PB15,
            miso: p.PB14,
            cs: p.PC6,
            reset: p.PC3,
            int: p.PC2,
            exti: p.EXTI2,
            dma_tx: p.DMA1_CH4,
            dma_rx: p.DMA1_CH3,
        };

        let dallas = settings::rtc_config().rtc_type == RtcType::Dallas;
        bus_capture::spawn(dallas).ok();
        rtc_task::spawn(net_periph, p.RNG, rtc).ok();

        (Shared {}, Local { bus })
    }

    /// Cartridge bus capture - feeds every access to the command dispatcher
    #[task(priority = 2, local = [bus])]
    async fn bus_capture(cx: bus_capture::Context, dallas: bool) {
        let mut dispatcher = Dispatcher::new(&FRAME_SLOT);
        if dallas {
            dispatcher = dispatcher.with_probes(&PROBE_QUEUE);
        }
        info!("Bus capture started (Dallas probes: {})", dallas);

        loop {
            cx.local.bus.strobe.wait_for_falling_edge().await;
            dispatcher.on_bus_access(bus::capture_address());
        }
    }

    /// RTC task - network bring-up, NTP acquisition, then the command loop
    ///
    /// Stack is !Send and must remain within this task.
    #[task(priority = 1)]
    async fn rtc_task(
        _cx: rtc_task::Context,
        periph: NetworkPeripherals,
        rng_periph: RngPeripheral,
        rtc: BoardRtc,
    ) {
        use embassy_net::{Config, StackResources};

        static WINDOW: ConstStaticCell<[u8; WINDOW_LEN]> = ConstStaticCell::new([0; WINDOW_LEN]);

        let config = settings::rtc_config();
        let rng = Rng::new(rng_periph, RngIrqs);
        let mut engine: Engine =
            RtcEngine::new(WINDOW.take(), rtc, rng, &FRAME_SLOT, config.clone());
        if config.rtc_type == RtcType::Dallas {
            engine = engine.with_probes(&PROBE_QUEUE);
        }
        engine.preinit();

        let net_config = NetworkConfig::default();
        let mut spi_config = spi::Config::default();
        spi_config.frequency = Hertz(net_config.spi_frequency_hz);

        let spi = Spi::new(
            periph.spi,
            periph.sck,
            periph.mosi,
            periph.miso,
            periph.dma_tx,
            periph.dma_rx,
            spi_config,
        );

        let eth_periph = manager::EthPeripherals {
            spi,
            cs: Output::new(periph.cs, Level::High, Speed::VeryHigh),
            reset: Output::new(periph.reset, Level::High, Speed::Low),
            int: ExtiInput::new(periph.int, periph.exti, Pull::Up),
        };

        let (device, mut eth_runner) =
            match manager::init_ethernet(eth_periph, net_config.mac_addr).await {
                Ok(parts) => parts,
                Err(e) => {
                    error!("{}, serving without network time", e);
                    serve(&mut engine).await
                }
            };

        static RESOURCES: StaticCell<StackResources<3>> = StaticCell::new();
        let (stack, mut net_runner) = embassy_net::new(
            device,
            Config::dhcpv4(Default::default()),
            RESOURCES.init(StackResources::new()),
            net_config.seed,
        );

        let app_logic = async {
            manager::wait_for_config(&stack).await;

            let mut rx_meta = [PacketMetadata::EMPTY; 2];
            let mut rx_buffer = [0u8; 128];
            let mut tx_meta = [PacketMetadata::EMPTY; 2];
            let mut tx_buffer = [0u8; 128];
            let socket = UdpSocket::new(
                stack,
                &mut rx_meta,
                &mut rx_buffer,
                &mut tx_meta,
                &mut tx_buffer,
            );

            match EmbassyLink::new(stack, socket, UdpConfig::default()) {
                Ok(mut link) => {
                    match ntp::acquire(&config.ntp, &mut link, &MonoClock, engine.rtc_mut()).await {
                        Ok(_) => engine.postinit(),
                        Err(e) => error!("Time acquisition failed: {}", e),
                    }
                }
                Err(e) => error!("{}", e),
            }

            serve(&mut engine).await
        };

        join3(eth_runner.run(), net_runner.run(), app_logic).await;
    }

    /// Main loop: one staged command per pass
    async fn serve(engine: &mut Engine) -> ! {
        info!("Serving host commands");
        loop {
            engine.poll();
            Mono::delay(1.millis()).await;
        }
    }

    /// RTIC idle task - WFI sleep mode when no tasks active
    #[idle]
    fn idle(_cx: idle::Context) -> ! {
        loop {
            cortex_m::asm::wfi();
        }
    }
}
