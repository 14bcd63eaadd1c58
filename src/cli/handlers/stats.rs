use color_eyre::{eyre::eyre, Result};

use crate::cli::args::{StatsCmd, StatsRangeArgs};
use crate::cli::print::print_json;
use crate::cli::Ctx;
use crate::inventory::types::StatsRange;
use crate::store::Collection;

pub async fn handle(ctx: &mut Ctx, cmd: StatsCmd) -> Result<()> {
  let result = match cmd {
    StatsCmd::Realtime => ctx.engine.client().get_estadisticas_tiempo_real().await?,
    StatsCmd::Maquina { maquina, range } => {
      ctx.load(&[Collection::Maquinas]).await?;
      let maquina = ctx.maquina(&maquina)?;
      ctx
        .engine
        .client()
        .get_estadisticas_maquina(&maquina.id, &stats_range(&range)?)
        .await?
    }
    StatsCmd::Resumen { range } => {
      ctx
        .engine
        .client()
        .get_estadisticas_resumen(&stats_range(&range)?)
        .await?
    }
  };
  if result.source.is_offline() {
    eprintln!("warning: server unreachable, showing cached statistics");
  }
  // The statistics payload is free-form; both modes print it as JSON
  print_json(&result.data)
}

fn stats_range(args: &StatsRangeArgs) -> Result<StatsRange> {
  if let (Some(desde), Some(hasta)) = (args.desde, args.hasta) {
    if desde > hasta {
      return Err(eyre!("--desde ({}) is after --hasta ({})", desde, hasta));
    }
  }
  Ok(StatsRange {
    ultimo_mes: args.ultimo_mes,
    fecha_inicio: args.desde.map(|d| d.format("%Y-%m-%d").to_string()),
    fecha_fin: args.hasta.map(|d| d.format("%Y-%m-%d").to_string()),
  })
}
